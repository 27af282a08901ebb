//! Visualization functions using Plotters for cluster analysis.

use crate::data::CleanedData;
use crate::model::{ClusterStats, SegmentationModel};
use plotters::prelude::*;

/// Color palette covering the service's maximum of 10 clusters.
static CLUSTER_COLORS: [RGBColor; 10] = [
    RED,
    BLUE,
    GREEN,
    MAGENTA,
    CYAN,
    RGBColor(255, 140, 0),  // orange
    RGBColor(128, 0, 128),  // purple
    RGBColor(139, 69, 19),  // brown
    RGBColor(47, 79, 79),   // slate
    RGBColor(255, 20, 147), // pink
];

fn cluster_color(cluster: usize) -> &'static RGBColor {
    CLUSTER_COLORS.get(cluster).unwrap_or(&BLACK)
}

/// Scatter plot of the first two standardized features, colored by cluster,
/// with centroids drawn as squares.
pub fn create_cluster_scatter(
    data: &CleanedData,
    model: &SegmentationModel,
    output_path: &str,
    plot_title: Option<&str>,
) -> crate::Result<()> {
    if data.features.ncols() < 2 {
        anyhow::bail!("scatter plot needs at least two feature columns");
    }
    let title = plot_title.unwrap_or("Customer Segments: Frequency vs Total Spent (standardized)");

    let xs: Vec<f64> = data.features.column(0).to_vec();
    let ys: Vec<f64> = data.features.column(1).to_vec();

    let x_min = xs.iter().fold(f64::INFINITY, |a, &b| a.min(b)) - 0.5;
    let x_max = xs.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)) + 0.5;
    let y_min = ys.iter().fold(f64::INFINITY, |a, &b| a.min(b)) - 0.5;
    let y_max = ys.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)) + 0.5;

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Purchase Frequency (standardized)")
        .y_desc("Total Spent (standardized)")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (i, (&x, &y)) in xs.iter().zip(ys.iter()).enumerate() {
        let color = cluster_color(model.labels[i]);
        chart.draw_series(std::iter::once(Circle::new((x, y), 4, color.filled())))?;
    }

    for (cluster_id, centroid) in model.centroids.outer_iter().enumerate() {
        let (cx, cy) = (centroid[0], centroid[1]);
        let color = cluster_color(cluster_id);
        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(cx - 0.1, cy - 0.1), (cx + 0.1, cy + 0.1)],
                color.filled(),
            )))?
            .label(format!("Cluster {} centroid", cluster_id))
            .legend(move |(x, y)| Rectangle::new([(x, y), (x + 10, y + 10)], color.filled()));
    }

    chart.configure_series_labels().draw()?;
    root.present()?;
    println!("Cluster scatter saved to: {}", output_path);

    Ok(())
}

/// Bar chart of cluster sizes.
pub fn create_cluster_size_chart(
    model: &SegmentationModel,
    output_path: &str,
) -> crate::Result<()> {
    let sizes = model.cluster_sizes();
    let max_size = *sizes.iter().max().unwrap_or(&1) as f64;

    let root = BitMapBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Cluster Sizes", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..(model.n_clusters as f64), 0f64..(max_size * 1.1))?;

    chart
        .configure_mesh()
        .x_desc("Cluster")
        .y_desc("Customers")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (cluster_id, &size) in sizes.iter().enumerate() {
        let color = cluster_color(cluster_id);
        chart.draw_series(std::iter::once(Rectangle::new(
            [
                (cluster_id as f64 - 0.4, 0.0),
                (cluster_id as f64 + 0.4, size as f64),
            ],
            color.filled(),
        )))?;
    }

    root.present()?;
    println!("Cluster size chart saved to: {}", output_path);

    Ok(())
}

/// Print the per-cluster report to the console.
pub fn print_cluster_statistics(
    data: &CleanedData,
    model: &SegmentationModel,
    stats: &[ClusterStats],
) {
    println!("\n=== Cluster Statistics ===");
    println!("Clusters: {}", model.n_clusters);
    println!("Customers: {}", data.n_customers());
    println!("Iterations: {}", model.n_iterations);
    println!("Within-cluster sum of squares (inertia): {:.2}", model.inertia);

    let silhouette = model.silhouette_sample(&data.features, 100.min(data.n_customers()));
    println!("Silhouette score (sample): {:.3}", silhouette);

    for entry in stats {
        println!(
            "\nCluster {}: {} customers ({:.1}%)",
            entry.cluster_id, entry.size, entry.percentage
        );
        if let Some(ref channel) = entry.top_channel {
            println!("  Dominant channel: {}", channel);
        }
        for (name, mean) in &entry.feature_means {
            println!("  mean {}: {:.2}", name, mean);
        }
    }
}

/// Main plot, size chart, and console report in one call.
pub fn generate_report(
    data: &CleanedData,
    model: &SegmentationModel,
    stats: &[ClusterStats],
    base_output_path: &str,
) -> crate::Result<()> {
    create_cluster_scatter(data, model, base_output_path, None)?;

    let size_chart_path = base_output_path.replace(".png", "_sizes.png");
    create_cluster_size_chart(model, &size_chart_path)?;

    print_cluster_statistics(data, model, stats);

    Ok(())
}

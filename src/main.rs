//! InsightCluster: customer segmentation CLI.
//!
//! Entrypoint that orchestrates data loading, model fitting, reporting,
//! and single-customer prediction.

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use insightcluster::{
    cluster_statistics, export_labeled_csv, fit_segmentation, load_and_clean, viz, AnalysisStore,
    Args, DatasetInfo, TrainingRecord,
};
use std::time::Instant;

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.verbose {
        println!("InsightCluster - Customer Segmentation using K-Means");
        println!("====================================================\n");
    }

    if let Some((numeric, channel)) = args.parse_customer_values()? {
        run_prediction_mode(&args, &numeric, &channel)?;
    } else {
        run_full_pipeline(&args)?;
    }

    Ok(())
}

/// Fit on the input file, then classify a single new customer.
fn run_prediction_mode(args: &Args, numeric: &[f64], channel: &str) -> Result<()> {
    println!("=== Prediction Mode ===");
    println!("Input values: {:?}, channel: {}", numeric, channel);

    let start = Instant::now();

    if args.verbose {
        println!("\nLoading training data from: {}", args.input);
    }
    let data = load_and_clean(&args.input)?;

    if args.verbose {
        println!("Loaded {} customers", data.n_customers());
        println!("\nFitting K-Means with {} clusters...", args.clusters);
    }
    let model = fit_segmentation(&data, args.clusters, args.max_iters, args.seed)?;

    let observation = data.scale_new_customer(numeric, channel)?;
    let cluster = model.predict_one(&observation)?;

    println!("\n✓ Predicted cluster: {}", cluster);
    println!("  Processing time: {:.2}s", start.elapsed().as_secs_f64());

    let sizes = model.cluster_sizes();
    let share = sizes[cluster] as f64 / data.n_customers() as f64 * 100.0;
    println!("\nCluster {} details:", cluster);
    println!("  Size: {} customers ({:.1}% of total)", sizes[cluster], share);

    Ok(())
}

/// Load, clean, fit, report, and export.
fn run_full_pipeline(args: &Args) -> Result<()> {
    println!("=== Full Clustering Pipeline ===\n");

    let start = Instant::now();
    let mut store = AnalysisStore::new();

    // Step 1: load and clean
    if args.verbose {
        println!("Step 1: Loading and cleaning data");
        println!("  Input file: {}", args.input);
    }
    let data = load_and_clean(&args.input)?;
    println!("✓ Data loaded: {} customers", data.n_customers());
    if args.verbose {
        println!("  Features: {:?}", data.feature_names);
    }

    let columns: Vec<String> = data
        .cleaned
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let dataset_id = store.register(DatasetInfo::new(&args.input, data.n_customers(), columns));
    if args.verbose {
        println!("  Dataset id: {}", dataset_id);
    }

    // Step 2: fit the model
    if args.verbose {
        println!("\nStep 2: Fitting K-Means");
        println!("  Clusters: {}", args.clusters);
        println!("  Max iterations: {}", args.max_iters);
        if let Some(seed) = args.seed {
            println!("  Seed: {}", seed);
        }
    }
    let fit_start = Instant::now();
    let model = fit_segmentation(&data, args.clusters, args.max_iters, args.seed)?;
    println!(
        "✓ Model fitted in {} iterations ({:.2}s)",
        model.n_iterations,
        fit_start.elapsed().as_secs_f64()
    );
    if args.verbose {
        println!("  Inertia: {:.2}", model.inertia);
    }

    // Step 3: per-cluster statistics
    let stats = cluster_statistics(&data, &model);
    store.record_training(
        &dataset_id,
        TrainingRecord {
            n_clusters: model.n_clusters,
            inertia: model.inertia,
            labels: model.labels.clone(),
            stats: stats.clone(),
            feature_names: data.feature_names.clone(),
            trained_at: Utc::now().to_rfc3339(),
        },
    );

    // Step 4: plots and console report
    if args.verbose {
        println!("\nStep 3: Generating visualizations");
        println!("  Output file: {}", args.output);
    }
    viz::generate_report(&data, &model, &stats, &args.output)?;

    // Step 5: optional labeled export
    if let Some(ref export_path) = args.export {
        export_labeled_csv(&data, &model.labels, export_path)?;
        println!("\nLabeled rows exported to: {}", export_path);
    }

    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", start.elapsed().as_secs_f64());

    Ok(())
}

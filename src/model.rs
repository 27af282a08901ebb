//! Training wrapper and per-cluster reporting around the K-Means engine.

use crate::data::{CleanedData, NUMERIC_COLUMNS};
use crate::kmeans::KMeans;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::collections::HashMap;

/// Cluster-count range accepted for a training run.
pub const MIN_CLUSTERS: usize = 2;
pub const MAX_CLUSTERS: usize = 10;
/// Iteration-cap range accepted for a training run.
pub const MIN_ITERATIONS: usize = 50;
pub const MAX_ITERATIONS: usize = 500;

/// A fitted segmentation: the engine plus the outputs callers read.
#[derive(Debug)]
pub struct SegmentationModel {
    /// Fitted clustering engine.
    pub engine: KMeans,
    /// Number of clusters.
    pub n_clusters: usize,
    /// Cluster assignment per customer row.
    pub labels: Vec<usize>,
    /// Cluster centroids in standardized feature space.
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares.
    pub inertia: f64,
    /// Iterations the fit ran before converging or hitting the cap.
    pub n_iterations: usize,
}

/// Per-cluster summary derived from labels and the raw (unscaled) rows.
#[derive(Debug, Clone)]
pub struct ClusterStats {
    pub cluster_id: usize,
    pub size: usize,
    /// Share of all customers, in percent.
    pub percentage: f64,
    /// Mean of each raw numeric feature over the cluster's members.
    pub feature_means: Vec<(String, f64)>,
    /// Most common purchase channel among members, if any.
    pub top_channel: Option<String>,
}

/// Fit a segmentation model on cleaned customer data.
///
/// Parameter ranges mirror the service contract: 2-10 clusters and a
/// 50-500 iteration cap. The engine itself imposes no upper bounds.
pub fn fit_segmentation(
    data: &CleanedData,
    n_clusters: usize,
    max_iterations: usize,
    random_state: Option<u64>,
) -> crate::Result<SegmentationModel> {
    if !(MIN_CLUSTERS..=MAX_CLUSTERS).contains(&n_clusters) {
        anyhow::bail!(
            "n_clusters must be between {} and {}, got {}",
            MIN_CLUSTERS,
            MAX_CLUSTERS,
            n_clusters
        );
    }
    if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&max_iterations) {
        anyhow::bail!(
            "max_iterations must be between {} and {}, got {}",
            MIN_ITERATIONS,
            MAX_ITERATIONS,
            max_iterations
        );
    }
    if data.features.nrows() < n_clusters {
        anyhow::bail!(
            "number of customers ({}) must be at least the number of clusters ({})",
            data.features.nrows(),
            n_clusters
        );
    }

    let mut engine = KMeans::new(n_clusters, max_iterations, random_state);
    let labels = engine.fit_predict(&data.features)?;

    let centroids = match engine.centroids() {
        Some(centroids) => centroids.clone(),
        None => anyhow::bail!("fit completed without a fitted state"),
    };
    let inertia = engine.inertia().unwrap_or(0.0);
    let n_iterations = engine.n_iterations().unwrap_or(0);
    log::info!(
        "fitted {} clusters in {} iterations, inertia {:.4}",
        n_clusters,
        n_iterations,
        inertia
    );

    Ok(SegmentationModel {
        engine,
        n_clusters,
        labels,
        centroids,
        inertia,
        n_iterations,
    })
}

impl SegmentationModel {
    /// Assign a standardized observation to its nearest cluster.
    pub fn predict_one(&self, features: &Array1<f64>) -> crate::Result<usize> {
        let observation = features.clone().insert_axis(Axis(0));
        let labels = self.engine.predict(&observation)?;
        labels
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("prediction returned no label"))
    }

    /// Number of customers assigned to each cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in &self.labels {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Silhouette coefficient averaged over the first `sample_size` rows.
    ///
    /// A full silhouette is quadratic in the row count; a sampled one is
    /// enough for the printed quality summary.
    pub fn silhouette_sample(&self, features: &Array2<f64>, sample_size: usize) -> f64 {
        let m = features.nrows().min(sample_size);
        if m < 2 {
            return 0.0;
        }

        let mut total = 0.0;
        for i in 0..m {
            let own = self.labels[i];
            let mut intra = Vec::new();
            let mut inter: Vec<Vec<f64>> = vec![Vec::new(); self.n_clusters];

            for j in 0..m {
                if i == j {
                    continue;
                }
                let dist = euclidean(features.row(i), features.row(j));
                let other = self.labels[j];
                if other == own {
                    intra.push(dist);
                } else if other < self.n_clusters {
                    inter[other].push(dist);
                }
            }

            let a = if intra.is_empty() {
                0.0
            } else {
                intra.iter().sum::<f64>() / intra.len() as f64
            };
            let b = inter
                .iter()
                .filter(|dists| !dists.is_empty())
                .map(|dists| dists.iter().sum::<f64>() / dists.len() as f64)
                .fold(f64::INFINITY, f64::min);

            if b.is_finite() && (a > 0.0 || b > 0.0) {
                total += (b - a) / a.max(b);
            }
        }

        total / m as f64
    }
}

/// Summarize each cluster: size, share, raw feature means, top channel.
pub fn cluster_statistics(data: &CleanedData, model: &SegmentationModel) -> Vec<ClusterStats> {
    let total = data.n_customers();
    let numeric: Vec<(usize, &String)> = data
        .feature_names
        .iter()
        .enumerate()
        .filter(|(_, name)| NUMERIC_COLUMNS.contains(&name.as_str()))
        .collect();

    (0..model.n_clusters)
        .map(|cluster_id| {
            let members: Vec<usize> = model
                .labels
                .iter()
                .enumerate()
                .filter(|&(_, &label)| label == cluster_id)
                .map(|(i, _)| i)
                .collect();
            let size = members.len();
            let percentage = if total > 0 {
                size as f64 / total as f64 * 100.0
            } else {
                0.0
            };

            let feature_means = numeric
                .iter()
                .map(|&(col, name)| {
                    let mean = if size == 0 {
                        0.0
                    } else {
                        members
                            .iter()
                            .map(|&i| data.raw_features[[i, col]])
                            .sum::<f64>()
                            / size as f64
                    };
                    (name.clone(), mean)
                })
                .collect();

            let mut counts: HashMap<&str, usize> = HashMap::new();
            for &i in &members {
                *counts.entry(data.channels[i].as_str()).or_insert(0) += 1;
            }
            // Ties resolve alphabetically so the report is deterministic.
            let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
            let top_channel = ranked.first().map(|(name, _)| name.to_string());

            ClusterStats {
                cluster_id,
                size,
                percentage,
                feature_means,
                top_channel,
            }
        })
        .collect()
}

fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StandardScaler;
    use ndarray::Array2;
    use polars::prelude::DataFrame;

    fn create_test_data() -> CleanedData {
        // Two obvious groups of three customers each.
        let raw_features = Array2::from_shape_vec(
            (6, 3),
            vec![
                2.0, 100.0, 1.0, //
                3.0, 120.0, 1.0, //
                2.5, 110.0, 1.0, //
                40.0, 5000.0, 0.0, //
                42.0, 5200.0, 0.0, //
                41.0, 5100.0, 0.0, //
            ],
        )
        .unwrap();
        let scaler = StandardScaler::fit(&raw_features);
        let features = scaler.transform(&raw_features);

        CleanedData {
            features,
            raw_features,
            feature_names: vec![
                "purchase_frequency".to_string(),
                "total_spent".to_string(),
                "channel_store".to_string(),
            ],
            customer_ids: (1..=6).map(|i| format!("C{:03}", i)).collect(),
            channels: vec![
                "store".to_string(),
                "store".to_string(),
                "store".to_string(),
                "online".to_string(),
                "online".to_string(),
                "online".to_string(),
            ],
            channel_values: vec!["store".to_string(), "online".to_string()],
            scaler,
            cleaned: DataFrame::empty(),
        }
    }

    #[test]
    fn test_fit_segmentation() {
        let data = create_test_data();
        let model = fit_segmentation(&data, 2, 100, Some(42)).unwrap();

        assert_eq!(model.n_clusters, 2);
        assert_eq!(model.labels.len(), 6);
        assert_eq!(model.centroids.shape(), &[2, 3]);
        assert!(model.inertia >= 0.0);
        assert!(model.n_iterations >= 1);

        // The two groups must come out as two distinct clusters.
        assert_eq!(model.labels[0], model.labels[1]);
        assert_eq!(model.labels[0], model.labels[2]);
        assert_eq!(model.labels[3], model.labels[4]);
        assert_eq!(model.labels[3], model.labels[5]);
        assert_ne!(model.labels[0], model.labels[3]);
    }

    #[test]
    fn test_invalid_parameters() {
        let data = create_test_data();

        assert!(fit_segmentation(&data, 1, 100, None).is_err());
        assert!(fit_segmentation(&data, 11, 100, None).is_err());
        assert!(fit_segmentation(&data, 3, 10, None).is_err());
        assert!(fit_segmentation(&data, 3, 501, None).is_err());
        // In range, but more clusters than customers.
        assert!(fit_segmentation(&data, 8, 100, None).is_err());
    }

    #[test]
    fn test_cluster_sizes_sum_to_total() {
        let data = create_test_data();
        let model = fit_segmentation(&data, 2, 100, Some(42)).unwrap();

        let sizes = model.cluster_sizes();
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes.iter().sum::<usize>(), 6);
    }

    #[test]
    fn test_cluster_statistics() {
        let data = create_test_data();
        let model = fit_segmentation(&data, 2, 100, Some(42)).unwrap();
        let stats = cluster_statistics(&data, &model);

        assert_eq!(stats.len(), 2);
        let total_pct: f64 = stats.iter().map(|s| s.percentage).sum();
        assert!((total_pct - 100.0).abs() < 1e-9);

        for entry in &stats {
            assert_eq!(entry.size, 3);
            assert_eq!(entry.feature_means.len(), 2);
            assert!(entry.top_channel.is_some());
        }

        // The low-spend cluster averages ~110 spent, the other ~5100.
        let mut spends: Vec<f64> = stats
            .iter()
            .map(|s| s.feature_means[1].1)
            .collect();
        spends.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((spends[0] - 110.0).abs() < 1e-9);
        assert!((spends[1] - 5100.0).abs() < 1e-9);
    }

    #[test]
    fn test_predict_one_matches_training_label() {
        let data = create_test_data();
        let model = fit_segmentation(&data, 2, 100, Some(42)).unwrap();

        let first_row = data.features.row(0).to_owned();
        let label = model.predict_one(&first_row).unwrap();
        assert_eq!(label, model.labels[0]);
    }

    #[test]
    fn test_silhouette_sample_range() {
        let data = create_test_data();
        let model = fit_segmentation(&data, 2, 100, Some(42)).unwrap();

        let score = model.silhouette_sample(&data.features, 6);
        assert!((-1.0..=1.0).contains(&score));
        // Two tight, well-separated groups score strongly positive.
        assert!(score > 0.5);
    }
}

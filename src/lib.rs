//! InsightCluster: customer segmentation with a from-scratch K-Means engine.
//!
//! The pipeline loads a customer CSV, cleans and standardizes it into a
//! numeric feature matrix (numeric columns plus one-hot encoded purchase
//! channels), partitions customers with an in-crate K-Means implementation,
//! and reports per-cluster statistics, plots, and a labeled CSV export.

pub mod cli;
pub mod data;
pub mod kmeans;
pub mod model;
pub mod store;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{export_labeled_csv, load_and_clean, CleanedData, StandardScaler};
pub use kmeans::{KMeans, KMeansError};
pub use model::{cluster_statistics, fit_segmentation, ClusterStats, SegmentationModel};
pub use store::{AnalysisStore, DatasetInfo, TrainingRecord};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;

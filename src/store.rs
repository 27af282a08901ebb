//! Session-scoped registry for datasets and their training results.
//!
//! Each loaded dataset gets an id; training results attach to that id. The
//! store is plain owned state handed around by reference, never a
//! process-wide global.

use crate::model::ClusterStats;
use chrono::Utc;
use std::collections::HashMap;

/// Metadata recorded when a dataset is registered.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    pub filename: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub uploaded_at: String,
}

impl DatasetInfo {
    pub fn new(filename: &str, rows: usize, columns: Vec<String>) -> Self {
        Self {
            filename: filename.to_string(),
            rows,
            columns,
            uploaded_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Outcome of one training run against a registered dataset.
#[derive(Debug, Clone)]
pub struct TrainingRecord {
    pub n_clusters: usize,
    pub inertia: f64,
    pub labels: Vec<usize>,
    pub stats: Vec<ClusterStats>,
    pub feature_names: Vec<String>,
    pub trained_at: String,
}

#[derive(Debug, Clone)]
pub struct AnalysisEntry {
    pub info: DatasetInfo,
    pub results: Option<TrainingRecord>,
}

/// In-memory map from dataset id to its info and latest results.
#[derive(Debug, Default)]
pub struct AnalysisStore {
    entries: HashMap<String, AnalysisEntry>,
}

impl AnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset under a timestamp-derived id and return the id.
    pub fn register(&mut self, info: DatasetInfo) -> String {
        let base = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let mut id = base.clone();
        let mut suffix = 1;
        while self.entries.contains_key(&id) {
            id = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        self.register_with_id(&id, info);
        id
    }

    /// Register a dataset under a caller-chosen id, replacing any previous
    /// entry with that id.
    pub fn register_with_id(&mut self, id: &str, info: DatasetInfo) {
        self.entries.insert(
            id.to_string(),
            AnalysisEntry {
                info,
                results: None,
            },
        );
    }

    pub fn info(&self, id: &str) -> Option<&DatasetInfo> {
        self.entries.get(id).map(|entry| &entry.info)
    }

    /// Attach training results to a registered dataset. Returns `false`
    /// when the id is unknown.
    pub fn record_training(&mut self, id: &str, record: TrainingRecord) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.results = Some(record);
                true
            }
            None => false,
        }
    }

    /// Training results for a dataset, `None` when the id is unknown or
    /// the dataset has not been trained yet.
    pub fn results(&self, id: &str) -> Option<&TrainingRecord> {
        self.entries.get(id).and_then(|entry| entry.results.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many registered datasets have been trained.
    pub fn trained_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.results.is_some())
            .count()
    }
}

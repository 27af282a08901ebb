//! Data loading, cleaning, and feature-matrix construction using Polars.
//!
//! Turns a raw customer CSV into the standardized numeric matrix the
//! clustering engine consumes: deduplication, numeric coercion, missing-value
//! handling, z-score outlier removal, one-hot channel encoding, and
//! per-column standardization.

use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use std::collections::HashSet;

/// Columns every input file must provide.
pub const REQUIRED_COLUMNS: [&str; 4] = [
    "customer_id",
    "purchase_frequency",
    "total_spent",
    "main_channel",
];

/// Numeric feature columns, in the order they enter the feature matrix.
pub const NUMERIC_COLUMNS: [&str; 6] = [
    "purchase_frequency",
    "total_spent",
    "avg_purchase_amount",
    "days_since_last_purchase",
    "customer_tenure_months",
    "distinct_products",
];

/// Rows with a null in any of these are dropped outright.
const CRITICAL_COLUMNS: [&str; 3] = ["purchase_frequency", "total_spent", "main_channel"];

/// Nulls in these are filled with the column median instead.
const OPTIONAL_COLUMNS: [&str; 4] = [
    "avg_purchase_amount",
    "days_since_last_purchase",
    "customer_tenure_months",
    "distinct_products",
];

/// Rows where any numeric column sits this many standard deviations from
/// the mean are treated as outliers.
const ZSCORE_THRESHOLD: f64 = 3.0;

/// Per-column standardization to zero mean and unit variance.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    means: Array1<f64>,
    stds: Array1<f64>,
}

impl StandardScaler {
    /// Fit means and standard deviations column-wise over `x`.
    pub fn fit(x: &Array2<f64>) -> Self {
        let means = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(x.ncols()));
        let mut stds = x.std_axis(Axis(0), 0.0);
        // A constant column keeps divisor 1.0 so it scales to zero offset
        // instead of dividing by zero.
        stds.mapv_inplace(|s| if s > 0.0 { s } else { 1.0 });
        Self { means, stds }
    }

    /// Standardize a matrix with the fitted parameters.
    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.means) / &self.stds
    }

    /// Standardize a single observation.
    pub fn transform_row(&self, row: &Array1<f64>) -> Array1<f64> {
        (row - &self.means) / &self.stds
    }
}

/// Cleaned dataset: the standardized feature matrix plus everything the
/// reporting side needs to describe clusters in raw terms.
#[derive(Debug)]
pub struct CleanedData {
    /// Standardized features, one row per customer.
    pub features: Array2<f64>,
    /// Same layout as `features`, before standardization.
    pub raw_features: Array2<f64>,
    /// Column names of the feature matrix (numeric columns, then channels).
    pub feature_names: Vec<String>,
    pub customer_ids: Vec<String>,
    /// Raw `main_channel` value per row.
    pub channels: Vec<String>,
    /// Distinct channel values in first-seen order (the one-hot layout).
    pub channel_values: Vec<String>,
    pub scaler: StandardScaler,
    /// Cleaned rows, kept for the labeled CSV export.
    pub cleaned: DataFrame,
}

impl CleanedData {
    pub fn n_customers(&self) -> usize {
        self.customer_ids.len()
    }

    /// Build and standardize a single observation from raw values, for
    /// classifying a new customer against a fitted model.
    pub fn scale_new_customer(&self, numeric: &[f64], channel: &str) -> crate::Result<Array1<f64>> {
        let n_numeric = self.feature_names.len() - self.channel_values.len();
        if numeric.len() != n_numeric {
            anyhow::bail!(
                "expected {} numeric values, got {}",
                n_numeric,
                numeric.len()
            );
        }
        if !self.channel_values.iter().any(|v| v == channel) {
            anyhow::bail!(
                "unknown channel '{}' (known channels: {})",
                channel,
                self.channel_values.join(", ")
            );
        }

        let mut raw: Vec<f64> = numeric.to_vec();
        for value in &self.channel_values {
            raw.push(if value == channel { 1.0 } else { 0.0 });
        }
        Ok(self.scaler.transform_row(&Array1::from(raw)))
    }
}

/// Load a customer CSV and run the full cleaning pipeline.
pub fn load_and_clean(path: &str) -> crate::Result<CleanedData> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.into()))?
        .finish()?;
    log::info!(
        "loaded {} rows x {} columns from {}",
        df.height(),
        df.width(),
        path
    );

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|name| df.column(name).is_err())
        .collect();
    if !missing.is_empty() {
        anyhow::bail!("missing required columns: {}", missing.join(", "));
    }

    let df = dedup_by_customer(df)?;
    let df = coerce_numeric_columns(df)?;
    let df = drop_missing_critical(df)?;
    let df = fill_optional_with_median(df)?;
    let df = remove_outliers(df)?;

    if df.height() == 0 {
        anyhow::bail!("no rows left after cleaning");
    }

    let (df, channels, channel_values) = encode_channels(df)?;
    prepare_features(df, channels, channel_values)
}

/// Append a `cluster` column to the cleaned rows and write them as CSV.
pub fn export_labeled_csv(data: &CleanedData, labels: &[usize], path: &str) -> crate::Result<()> {
    if labels.len() != data.cleaned.height() {
        anyhow::bail!(
            "label count ({}) does not match row count ({})",
            labels.len(),
            data.cleaned.height()
        );
    }

    let mut df = data.cleaned.clone();
    let clusters: Vec<u32> = labels.iter().map(|&label| label as u32).collect();
    df.with_column(Series::new("cluster", clusters))?;

    let mut file = std::fs::File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;
    log::info!("exported {} labeled rows to {}", df.height(), path);
    Ok(())
}

/// Keep the first row seen for each customer id.
fn dedup_by_customer(df: DataFrame) -> crate::Result<DataFrame> {
    let keep: Vec<bool> = {
        let ids = df.column("customer_id")?.cast(&DataType::String)?;
        let mut seen = HashSet::new();
        ids.str()?
            .into_iter()
            .map(|id| seen.insert(id.unwrap_or("").to_string()))
            .collect()
    };

    let before = df.height();
    let filtered = df.filter(&BooleanChunked::from_slice("keep", &keep))?;
    if filtered.height() < before {
        log::debug!(
            "removed {} duplicate customer rows",
            before - filtered.height()
        );
    }
    Ok(filtered)
}

/// Cast the numeric columns to `f64`; non-numeric text becomes null.
fn coerce_numeric_columns(mut df: DataFrame) -> crate::Result<DataFrame> {
    for name in NUMERIC_COLUMNS {
        let coerced = match df.column(name) {
            Ok(column) => {
                let nulls_before = column.null_count();
                let cast = column.cast(&DataType::Float64)?;
                let introduced = cast.null_count().saturating_sub(nulls_before);
                if introduced > 0 {
                    log::debug!(
                        "'{}': {} non-numeric values coerced to null",
                        name,
                        introduced
                    );
                }
                cast
            }
            Err(_) => continue,
        };
        df.with_column(coerced)?;
    }
    Ok(df)
}

/// Drop rows missing any critical column.
fn drop_missing_critical(df: DataFrame) -> crate::Result<DataFrame> {
    let mut mask: Option<BooleanChunked> = None;
    for name in CRITICAL_COLUMNS {
        let not_null = df.column(name)?.is_not_null();
        mask = Some(match mask {
            Some(acc) => &acc & &not_null,
            None => not_null,
        });
    }

    let before = df.height();
    let filtered = match mask {
        Some(mask) => df.filter(&mask)?,
        None => df,
    };
    if filtered.height() < before {
        log::debug!(
            "removed {} rows with nulls in critical columns",
            before - filtered.height()
        );
    }
    Ok(filtered)
}

/// Fill nulls in optional numeric columns with the column median.
fn fill_optional_with_median(mut df: DataFrame) -> crate::Result<DataFrame> {
    for name in OPTIONAL_COLUMNS {
        let filled = match df.column(name) {
            Ok(column) => {
                let values = column.f64()?;
                let null_count = values.null_count();
                if null_count == 0 {
                    continue;
                }
                let median = values.median().unwrap_or(0.0);
                log::debug!(
                    "filled {} nulls in '{}' with median {:.2}",
                    null_count,
                    name,
                    median
                );
                let filled: Vec<f64> = values
                    .into_iter()
                    .map(|value| value.unwrap_or(median))
                    .collect();
                Series::new(name, filled)
            }
            Err(_) => continue,
        };
        df.with_column(filled)?;
    }
    Ok(df)
}

/// Drop rows where any numeric column's |z-score| crosses the threshold.
/// A zero-variance column is skipped; it cannot have outliers.
fn remove_outliers(df: DataFrame) -> crate::Result<DataFrame> {
    let mut keep = vec![true; df.height()];
    for name in NUMERIC_COLUMNS {
        let column = match df.column(name) {
            Ok(column) => column,
            Err(_) => continue,
        };
        let values = column.f64()?;
        let mean = values.mean().unwrap_or(0.0);
        let std = values.std(0).unwrap_or(0.0);
        if std <= 0.0 {
            continue;
        }
        for (i, value) in values.into_iter().enumerate() {
            if let Some(v) = value {
                if ((v - mean) / std).abs() >= ZSCORE_THRESHOLD {
                    keep[i] = false;
                }
            }
        }
    }

    let before = df.height();
    let filtered = df.filter(&BooleanChunked::from_slice("keep", &keep))?;
    if filtered.height() < before {
        log::info!("removed {} outlier rows", before - filtered.height());
    }
    Ok(filtered)
}

/// One-hot encode `main_channel` into `channel_*` indicator columns.
/// Distinct values keep first-seen order so the encoded layout is
/// deterministic for a given file.
fn encode_channels(mut df: DataFrame) -> crate::Result<(DataFrame, Vec<String>, Vec<String>)> {
    let channels: Vec<String> = {
        let column = df.column("main_channel")?.cast(&DataType::String)?;
        column
            .str()?
            .into_iter()
            .map(|value| value.unwrap_or("").to_string())
            .collect()
    };

    let mut channel_values = Vec::new();
    let mut seen = HashSet::new();
    for channel in &channels {
        if seen.insert(channel.clone()) {
            channel_values.push(channel.clone());
        }
    }
    log::debug!("channels found: {}", channel_values.join(", "));

    for value in &channel_values {
        let indicator: Vec<f64> = channels
            .iter()
            .map(|channel| if channel == value { 1.0 } else { 0.0 })
            .collect();
        df.with_column(Series::new(&channel_column_name(value), indicator))?;
    }

    Ok((df, channels, channel_values))
}

/// Column name for a channel indicator, stripped to ascii alphanumerics.
pub fn channel_column_name(value: &str) -> String {
    let clean: String = value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    format!("channel_{}", clean)
}

/// Assemble the feature matrix and standardize it.
fn prepare_features(
    df: DataFrame,
    channels: Vec<String>,
    channel_values: Vec<String>,
) -> crate::Result<CleanedData> {
    let customer_ids: Vec<String> = {
        let ids = df.column("customer_id")?.cast(&DataType::String)?;
        ids.str()?
            .into_iter()
            .map(|id| id.unwrap_or("").to_string())
            .collect()
    };

    let mut feature_names: Vec<String> = NUMERIC_COLUMNS
        .iter()
        .filter(|name| df.column(name).is_ok())
        .map(|name| name.to_string())
        .collect();
    feature_names.extend(channel_values.iter().map(|value| channel_column_name(value)));

    let n = df.height();
    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(feature_names.len());
    for name in &feature_names {
        columns.push(df.column(name)?.f64()?.into_no_null_iter().collect());
    }

    let mut raw = Vec::with_capacity(n * feature_names.len());
    for i in 0..n {
        for column in &columns {
            raw.push(column[i]);
        }
    }
    let raw_features = Array2::from_shape_vec((n, feature_names.len()), raw)?;

    let scaler = StandardScaler::fit(&raw_features);
    let features = scaler.transform(&raw_features);
    log::info!("prepared feature matrix: {} x {}", n, feature_names.len());

    Ok(CleanedData {
        features,
        raw_features,
        feature_names,
        customer_ids,
        channels,
        channel_values,
        scaler,
        cleaned: df,
    })
}

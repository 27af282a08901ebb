//! Command-line interface definitions and argument parsing.

use clap::Parser;

/// Customer segmentation CLI using K-Means clustering
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file
    #[arg(short, long, default_value = "customers.csv")]
    pub input: String,

    /// Number of clusters for K-Means (2-10)
    #[arg(short = 'k', long, default_value_t = 3)]
    pub clusters: usize,

    /// Maximum iterations for the clustering loop (50-500)
    #[arg(long, default_value_t = 100)]
    pub max_iters: usize,

    /// Random seed for reproducible clustering; omit for a random run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output path for the cluster plot
    #[arg(short, long, default_value = "cluster_plot.png")]
    pub output: String,

    /// Optional path to export the cleaned rows with their cluster labels
    #[arg(long)]
    pub export: Option<String>,

    /// Prediction mode: classify one customer instead of reporting clusters.
    /// Six numeric values followed by the channel, comma-separated:
    /// "frequency,total,avg,days_since,tenure_months,products,channel"
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse the `--predict` string into numeric features and a channel.
    pub fn parse_customer_values(&self) -> crate::Result<Option<(Vec<f64>, String)>> {
        let Some(ref predict) = self.predict else {
            return Ok(None);
        };

        let parts: Vec<&str> = predict.split(',').map(str::trim).collect();
        if parts.len() != 7 {
            anyhow::bail!(
                "predict values must be six numbers and a channel: \
                 'frequency,total,avg,days_since,tenure_months,products,channel'"
            );
        }

        let mut numeric = Vec::with_capacity(6);
        for part in &parts[..6] {
            let value: f64 = part
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid numeric value: {}", part))?;
            numeric.push(value);
        }

        Ok(Some((numeric, parts[6].to_string())))
    }
}

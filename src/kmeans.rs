//! From-scratch K-Means clustering engine.
//!
//! Implements Lloyd's algorithm with plain random initialization: centroids
//! start as a without-replacement sample of the observations, then the
//! assign/update loop runs until the label vector stops changing or the
//! iteration cap is hit. Random initialization (rather than k-means++) is a
//! deliberate simplicity/reproducibility tradeoff: with a fixed
//! `random_state` every fit is bit-for-bit repeatable.

use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;

/// Errors produced by the clustering engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KMeansError {
    /// The input cannot satisfy the requested configuration
    /// (fewer observations than clusters, dimensionality mismatch, ...).
    InvalidInput(String),
    /// `predict` was called before a successful `fit`.
    NotFitted,
}

impl fmt::Display for KMeansError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KMeansError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            KMeansError::NotFitted => write!(f, "model has not been fitted yet"),
        }
    }
}

impl std::error::Error for KMeansError {}

/// State produced by a successful `fit`.
#[derive(Debug, Clone)]
struct FittedState {
    centroids: Array2<f64>,
    labels: Vec<usize>,
    inertia: f64,
    n_iterations: usize,
}

/// K-Means clustering over a standardized feature matrix.
///
/// One instance is meant to be created per training run; the fitted state
/// (centroids, labels, inertia) lives only inside the instance and the
/// engine never keeps a reference to the caller's matrix.
#[derive(Debug, Clone)]
pub struct KMeans {
    n_clusters: usize,
    max_iterations: usize,
    random_state: Option<u64>,
    fitted: Option<FittedState>,
}

impl KMeans {
    /// Creates a new, unfitted engine.
    ///
    /// Parameter ranges are the caller's responsibility; the engine only
    /// rejects configurations it cannot execute (see [`KMeans::fit`]).
    pub fn new(n_clusters: usize, max_iterations: usize, random_state: Option<u64>) -> Self {
        Self {
            n_clusters,
            max_iterations,
            random_state,
            fitted: None,
        }
    }

    /// Partitions `x` (shape `n_observations x n_features`) into
    /// `n_clusters` clusters.
    ///
    /// Each iteration assigns every observation to its nearest centroid and
    /// recomputes centroids as the mean of their members. A cluster left
    /// with no members is re-seeded to a uniformly random observation
    /// (drawn with replacement) instead of being left degenerate. The loop
    /// stops as soon as two consecutive assignments are identical; a
    /// stabilized partition performs no further centroid update.
    ///
    /// A failed fit leaves the engine unfitted.
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<(), KMeansError> {
        self.fitted = None;

        let n = x.nrows();
        if n == 0 || x.ncols() == 0 {
            return Err(KMeansError::InvalidInput(
                "training data must have at least one observation and one feature".to_string(),
            ));
        }
        if self.n_clusters == 0 || self.n_clusters > n {
            return Err(KMeansError::InvalidInput(format!(
                "cannot sample {} centroids from {} observations",
                self.n_clusters, n
            )));
        }
        if self.max_iterations == 0 {
            return Err(KMeansError::InvalidInput(
                "max_iterations must be positive".to_string(),
            ));
        }

        let mut rng = match self.random_state {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        // Initial centroids: n_clusters distinct observations.
        let mut centroids = Array2::zeros((self.n_clusters, x.ncols()));
        for (c, idx) in rand::seq::index::sample(&mut rng, n, self.n_clusters)
            .into_iter()
            .enumerate()
        {
            centroids.row_mut(c).assign(&x.row(idx));
        }

        // usize::MAX is never a valid label, so the first iteration cannot
        // trigger the convergence check.
        let mut labels = vec![usize::MAX; n];
        let mut n_iterations = 0;

        for iteration in 0..self.max_iterations {
            n_iterations = iteration + 1;
            let new_labels = assign_labels(x, &centroids);
            if new_labels == labels {
                log::debug!("assignments stable after {} iterations", n_iterations);
                break;
            }
            update_centroids(x, &new_labels, &mut centroids, &mut rng);
            labels = new_labels;
        }

        let inertia = calculate_inertia(x, &centroids, &labels);
        self.fitted = Some(FittedState {
            centroids,
            labels,
            inertia,
            n_iterations,
        });
        Ok(())
    }

    /// Assigns each observation in `x` to its nearest fitted centroid.
    ///
    /// Does not re-fit or mutate any state. Fails with
    /// [`KMeansError::NotFitted`] before a successful [`KMeans::fit`] and
    /// with [`KMeansError::InvalidInput`] when the dimensionality differs
    /// from the training data.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>, KMeansError> {
        let state = self.fitted.as_ref().ok_or(KMeansError::NotFitted)?;
        if x.ncols() != state.centroids.ncols() {
            return Err(KMeansError::InvalidInput(format!(
                "expected {} features per observation, got {}",
                state.centroids.ncols(),
                x.ncols()
            )));
        }
        Ok(assign_labels(x, &state.centroids))
    }

    /// Fits on `x` and returns the resulting label vector.
    pub fn fit_predict(&mut self, x: &Array2<f64>) -> Result<Vec<usize>, KMeansError> {
        self.fit(x)?;
        Ok(self
            .fitted
            .as_ref()
            .map(|state| state.labels.clone())
            .unwrap_or_default())
    }

    /// Fitted centroids (`n_clusters x n_features`), `None` until fitted.
    pub fn centroids(&self) -> Option<&Array2<f64>> {
        self.fitted.as_ref().map(|state| &state.centroids)
    }

    /// Training labels from the last fit, `None` until fitted.
    pub fn labels(&self) -> Option<&[usize]> {
        self.fitted.as_ref().map(|state| state.labels.as_slice())
    }

    /// Sum of squared distances to assigned centroids, `None` until fitted.
    pub fn inertia(&self) -> Option<f64> {
        self.fitted.as_ref().map(|state| state.inertia)
    }

    /// Number of iterations the last fit ran, `None` until fitted.
    pub fn n_iterations(&self) -> Option<usize> {
        self.fitted.as_ref().map(|state| state.n_iterations)
    }

    /// Configured cluster count.
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }
}

fn assign_labels(x: &Array2<f64>, centroids: &Array2<f64>) -> Vec<usize> {
    x.outer_iter()
        .map(|point| nearest_centroid(point, centroids).0)
        .collect()
}

/// Index of the closest centroid and the squared distance to it.
///
/// Squared Euclidean distance ranks identically to Euclidean, so the sqrt
/// is skipped. Ties resolve to the lowest cluster index: the scan uses
/// strict `<`, so the first minimum wins. Reproducibility on symmetric
/// inputs depends on this tie-break.
fn nearest_centroid(point: ArrayView1<f64>, centroids: &Array2<f64>) -> (usize, f64) {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (c, centroid) in centroids.outer_iter().enumerate() {
        let dist = squared_distance(point, centroid);
        if dist < best_dist {
            best_dist = dist;
            best = c;
        }
    }
    (best, best_dist)
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

fn update_centroids(
    x: &Array2<f64>,
    labels: &[usize],
    centroids: &mut Array2<f64>,
    rng: &mut StdRng,
) {
    let k = centroids.nrows();
    let mut sums = Array2::<f64>::zeros((k, centroids.ncols()));
    let mut counts = vec![0usize; k];

    for (i, &label) in labels.iter().enumerate() {
        for (sum, value) in sums.row_mut(label).iter_mut().zip(x.row(i).iter()) {
            *sum += *value;
        }
        counts[label] += 1;
    }

    for c in 0..k {
        if counts[c] > 0 {
            let count = counts[c] as f64;
            for (centroid, sum) in centroids.row_mut(c).iter_mut().zip(sums.row(c).iter()) {
                *centroid = *sum / count;
            }
        } else {
            // Re-seed an empty cluster with a random observation so the
            // partition never carries an orphaned centroid. The draw is
            // with replacement over the full dataset.
            let idx = rng.gen_range(0..x.nrows());
            centroids.row_mut(c).assign(&x.row(idx));
        }
    }
}

fn calculate_inertia(x: &Array2<f64>, centroids: &Array2<f64>, labels: &[usize]) -> f64 {
    labels
        .iter()
        .enumerate()
        .map(|(i, &label)| squared_distance(x.row(i), centroids.row(label)))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<f64>>) -> Array2<f64> {
        let n = rows.len();
        let d = rows[0].len();
        Array2::from_shape_vec((n, d), rows.into_iter().flatten().collect()).unwrap()
    }

    /// 20 points around (0,0) and 20 around (10,10).
    fn two_blobs() -> Array2<f64> {
        let mut rows = Vec::new();
        for i in 0..20 {
            let jitter = (i as f64) * 0.01;
            rows.push(vec![jitter, -jitter]);
        }
        for i in 0..20 {
            let jitter = (i as f64) * 0.01;
            rows.push(vec![10.0 + jitter, 10.0 - jitter]);
        }
        matrix(rows)
    }

    #[test]
    fn test_insufficient_observations() {
        let x = matrix(vec![vec![0.0, 0.0], vec![1.0, 1.0]]);
        let mut kmeans = KMeans::new(3, 100, Some(42));
        let result = kmeans.fit(&x);
        assert!(matches!(result, Err(KMeansError::InvalidInput(_))));
        // A failed fit must leave the engine unfitted.
        assert!(matches!(kmeans.predict(&x), Err(KMeansError::NotFitted)));
    }

    #[test]
    fn test_predict_before_fit() {
        let kmeans = KMeans::new(2, 100, None);
        let x = matrix(vec![vec![1.0, 2.0]]);
        assert!(matches!(kmeans.predict(&x), Err(KMeansError::NotFitted)));
    }

    #[test]
    fn test_predict_dimension_mismatch() {
        let x = matrix(vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![9.0, 9.0]]);
        let mut kmeans = KMeans::new(2, 100, Some(7));
        kmeans.fit(&x).unwrap();
        let narrow = matrix(vec![vec![1.0]]);
        assert!(matches!(
            kmeans.predict(&narrow),
            Err(KMeansError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_two_separated_clusters() {
        let x = two_blobs();
        let mut kmeans = KMeans::new(2, 100, Some(42));
        let labels = kmeans.fit_predict(&x).unwrap();

        // All points near (0,0) share one label, all near (10,10) the other.
        let first = labels[0];
        assert!(labels[..20].iter().all(|&l| l == first));
        let second = labels[20];
        assert_ne!(first, second);
        assert!(labels[20..].iter().all(|&l| l == second));
    }

    #[test]
    fn test_label_range_and_length() {
        let x = two_blobs();
        let mut kmeans = KMeans::new(4, 100, Some(3));
        let labels = kmeans.fit_predict(&x).unwrap();
        assert_eq!(labels.len(), x.nrows());
        assert!(labels.iter().all(|&l| l < 4));
    }

    #[test]
    fn test_deterministic_with_seed() {
        let x = two_blobs();
        let mut first = KMeans::new(3, 100, Some(1234));
        let mut second = KMeans::new(3, 100, Some(1234));
        let labels_a = first.fit_predict(&x).unwrap();
        let labels_b = second.fit_predict(&x).unwrap();

        assert_eq!(labels_a, labels_b);
        assert_eq!(first.inertia(), second.inertia());
        assert_eq!(first.n_iterations(), second.n_iterations());
    }

    #[test]
    fn test_empty_cluster_recovery() {
        // Nine identical points plus one outlier, k=3: at least one cluster
        // goes empty and must be re-seeded rather than crash.
        let mut rows = vec![vec![5.0, 5.0]; 9];
        rows.push(vec![100.0, 100.0]);
        let x = matrix(rows);

        let mut kmeans = KMeans::new(3, 100, Some(0));
        let labels = kmeans.fit_predict(&x).unwrap();
        assert_eq!(labels.len(), 10);
        assert!(labels.iter().all(|&l| l < 3));
        assert!(kmeans.inertia().unwrap() >= 0.0);
    }

    #[test]
    fn test_all_identical_points() {
        let x = matrix(vec![vec![5.0, 5.0]; 6]);
        let mut kmeans = KMeans::new(2, 100, Some(11));
        let labels = kmeans.fit_predict(&x).unwrap();
        assert_eq!(labels.len(), 6);
        assert!(kmeans.inertia().unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_singleton_groups_converge_immediately() {
        // k == n with well-separated points: the initial centroids are the
        // points themselves, so the second iteration must detect stability.
        let x = matrix(vec![vec![0.0, 0.0], vec![100.0, 0.0], vec![0.0, 100.0]]);
        let mut kmeans = KMeans::new(3, 100, Some(5));
        kmeans.fit(&x).unwrap();
        assert_eq!(kmeans.n_iterations(), Some(2));
        assert!(kmeans.inertia().unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_inertia_non_increasing() {
        let x = two_blobs();

        let mut capped = KMeans::new(2, 1, Some(99));
        capped.fit(&x).unwrap();
        let mut converged = KMeans::new(2, 100, Some(99));
        converged.fit(&x).unwrap();

        // Every assign/update round lowers (or keeps) the objective, so the
        // converged run can never report more inertia than the capped one.
        assert!(converged.inertia().unwrap() <= capped.inertia().unwrap() + 1e-9);
    }

    #[test]
    fn test_predict_agrees_with_fit_on_converged_data() {
        let x = two_blobs();
        let mut kmeans = KMeans::new(2, 100, Some(21));
        let fit_labels = kmeans.fit_predict(&x).unwrap();
        let predicted = kmeans.predict(&x).unwrap();
        assert_eq!(fit_labels, predicted);
    }

    #[test]
    fn test_exact_centroids_for_duplicated_points() {
        let x = matrix(vec![
            vec![0.0, 0.0],
            vec![0.0, 0.0],
            vec![0.0, 0.0],
            vec![4.0, 4.0],
            vec![4.0, 4.0],
            vec![4.0, 4.0],
        ]);
        let mut kmeans = KMeans::new(2, 100, Some(8));
        kmeans.fit(&x).unwrap();
        // Both groups collapse onto their own point, so the fit is exact.
        assert!(kmeans.inertia().unwrap().abs() < 1e-12);

        let centroids = kmeans.centroids().unwrap();
        let mut coords: Vec<f64> = centroids.outer_iter().map(|row| row[0]).collect();
        coords.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(coords, vec![0.0, 4.0]);
    }
}

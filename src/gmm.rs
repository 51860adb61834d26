use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use std::f64::consts::PI;
use tracing::debug;

use crate::logmath::{log_sum_exp, ZERO_LOG_PROB};
use crate::ModelError;

/// Set of diagonal-covariance Gaussian mixture models.  Every GMM owns
/// a contiguous range of Gaussians in the flat parameter arrays.
///
/// Each Gaussian caches its log normalization constant plus log mixture
/// weight.  The setters do not refresh that cache: call
/// [`GmmSet::compute_norms`] after changing weights or variances.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GmmSet {
    /// For each GMM, index of its first Gaussian
    gmm_map: Vec<usize>,
    /// Mixture weight of each Gaussian
    weights: Vec<f64>,
    /// One row of means per Gaussian
    means: Array2<f64>,
    /// One row of variances per Gaussian
    vars: Array2<f64>,
    /// Log norm constant + log weight of each Gaussian
    log_norms: Vec<f64>,
}

impl GmmSet {
    /// GMMs with `gauss_counts[i]` Gaussians each over `dim` dimensions,
    /// with uniform weights, zero means and unit variances.
    pub fn new(gauss_counts: &[usize], dim: usize) -> Self {
        let mut gmms = Self::default();
        gmms.init(gauss_counts, dim);
        gmms
    }

    /// GMMs from already-parsed parameters: Gaussian counts per GMM,
    /// then weights, means and variances with one entry or row per
    /// Gaussian.
    pub fn from_params(
        gauss_counts: &[usize],
        weights: Vec<f64>,
        means: Array2<f64>,
        vars: Array2<f64>,
    ) -> Result<Self, ModelError> {
        let total: usize = gauss_counts.iter().sum();
        if weights.len() != total || means.nrows() != total {
            return Err(ModelError::InconsistentGmm(format!(
                "{} Gaussians in GMMs but {} weights and {} means",
                total,
                weights.len(),
                means.nrows()
            )));
        }
        if means.dim() != vars.dim() {
            return Err(ModelError::InconsistentGmm(format!(
                "means are {:?} but variances are {:?}",
                means.dim(),
                vars.dim()
            )));
        }
        if let Some(var) = vars.iter().find(|&&var| !(var > 0.0)) {
            return Err(ModelError::InconsistentGmm(format!("non-positive variance {}", var)));
        }
        let mut gmms = Self {
            gmm_map: gmm_map(gauss_counts),
            weights,
            means,
            vars,
            log_norms: Vec::new(),
        };
        gmms.compute_norms();
        Ok(gmms)
    }

    /// Reset to `gauss_counts[i]` Gaussians per GMM over `dim`
    /// dimensions, with uniform weights, zero means and unit variances.
    pub fn init(&mut self, gauss_counts: &[usize], dim: usize) {
        let total: usize = gauss_counts.iter().sum();
        self.gmm_map = gmm_map(gauss_counts);
        self.weights = gauss_counts
            .iter()
            .flat_map(|&count| std::iter::repeat(1.0 / count as f64).take(count))
            .collect();
        self.means = Array2::zeros((total, dim));
        self.vars = Array2::ones((total, dim));
        self.compute_norms();
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.gmm_map.is_empty()
    }

    /// Recompute the cached log norm constant + log weight of every
    /// Gaussian from the current weights and variances.
    pub fn compute_norms(&mut self) {
        self.log_norms = self
            .vars
            .outer_iter()
            .zip(&self.weights)
            .map(|(vars, &weight)| {
                let log_weight = if weight > 0.0 { weight.ln() } else { ZERO_LOG_PROB };
                log_weight - 0.5 * vars.iter().map(|&var| (2.0 * PI * var).ln()).sum::<f64>()
            })
            .collect();
    }

    pub fn gmm_count(&self) -> usize {
        self.gmm_map.len()
    }

    pub fn gaussian_count(&self) -> usize {
        self.weights.len()
    }

    /// Dimension of the expected feature vectors
    pub fn dim_count(&self) -> usize {
        self.means.ncols()
    }

    /// Index of the first Gaussian of GMM `gmm`
    ///
    /// Panics if `gmm` is out of range.
    pub fn min_gaussian_index(&self, gmm: usize) -> usize {
        self.gmm_map[gmm]
    }

    /// One past the index of the last Gaussian of GMM `gmm`
    ///
    /// Panics if `gmm` is out of range.
    pub fn max_gaussian_index(&self, gmm: usize) -> usize {
        assert!(gmm < self.gmm_count(), "GMM index {} out of range", gmm);
        self.gmm_map
            .get(gmm + 1)
            .copied()
            .unwrap_or_else(|| self.gaussian_count())
    }

    /// Mixture weight of Gaussian `gauss`.  This and the other
    /// per-Gaussian accessors panic if `gauss` (or `dim`) is out of range.
    pub fn gaussian_weight(&self, gauss: usize) -> f64 {
        self.weights[gauss]
    }

    pub fn set_gaussian_weight(&mut self, gauss: usize, weight: f64) {
        self.weights[gauss] = weight;
    }

    pub fn gaussian_mean(&self, gauss: usize, dim: usize) -> f64 {
        self.means[[gauss, dim]]
    }

    pub fn set_gaussian_mean(&mut self, gauss: usize, dim: usize, mean: f64) {
        self.means[[gauss, dim]] = mean;
    }

    pub fn gaussian_var(&self, gauss: usize, dim: usize) -> f64 {
        self.vars[[gauss, dim]]
    }

    pub fn set_gaussian_var(&mut self, gauss: usize, dim: usize, var: f64) {
        self.vars[[gauss, dim]] = var;
    }

    /// Cached log norm constant + log weight of Gaussian `gauss`
    ///
    /// Panics if `gauss` is out of range.
    pub fn gaussian_norm(&self, gauss: usize) -> f64 {
        self.log_norms[gauss]
    }

    fn check_dim(&self, feats: &Array2<f64>) -> Result<(), ModelError> {
        if feats.ncols() != self.dim_count() {
            return Err(ModelError::DimensionMismatch {
                expected: self.dim_count(),
                got: feats.ncols(),
            });
        }
        Ok(())
    }

    /// Log prob of each Gaussian of `gmm` for one frame, left in
    /// `log_probs`; returns the total log prob of the GMM.
    fn frame_log_probs(&self, frame: ArrayView1<f64>, gmm: usize, log_probs: &mut Vec<f64>) -> f64 {
        log_probs.clear();
        for gauss in self.min_gaussian_index(gmm)..self.max_gaussian_index(gmm) {
            let dist: f64 = frame
                .iter()
                .zip(self.means.row(gauss))
                .zip(self.vars.row(gauss))
                .map(|((&x, &mean), &var)| {
                    let diff = x - mean;
                    diff * diff / var
                })
                .sum();
            log_probs.push(self.log_norms[gauss] - 0.5 * dist);
        }
        log_sum_exp(log_probs)
    }

    /// Log prob of each Gaussian of GMM `gmm` for frame `frame` of
    /// `feats`, along with the total log prob of the GMM.
    pub fn gaussian_log_probs(
        &self,
        feats: &Array2<f64>,
        frame: usize,
        gmm: usize,
    ) -> Result<(Vec<f64>, f64), ModelError> {
        self.check_dim(feats)?;
        if frame >= feats.nrows() {
            return Err(ModelError::IndexOutOfRange {
                what: "frame",
                index: frame,
                len: feats.nrows(),
            });
        }
        if gmm >= self.gmm_count() {
            return Err(ModelError::IndexOutOfRange {
                what: "GMM",
                index: gmm,
                len: self.gmm_count(),
            });
        }
        let mut log_probs = Vec::new();
        let total = self.frame_log_probs(feats.row(frame), gmm, &mut log_probs);
        Ok((log_probs, total))
    }

    /// Log prob of every GMM for every frame of `feats`, as a
    /// frames x GMMs matrix.  Frames are scored in parallel.
    pub fn score_frames(&self, feats: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        self.check_dim(feats)?;
        let n_gmms = self.gmm_count();
        let scores: Vec<f64> = (0..feats.nrows())
            .into_par_iter()
            .flat_map_iter(|frame| {
                let row = feats.row(frame);
                let mut log_probs = Vec::new();
                (0..n_gmms)
                    .map(|gmm| self.frame_log_probs(row, gmm, &mut log_probs))
                    .collect::<Vec<f64>>()
            })
            .collect();
        debug!(frames = feats.nrows(), gmms = n_gmms, "scored frames");
        Array2::from_shape_vec((feats.nrows(), n_gmms), scores)
            .map_err(|err| ModelError::InconsistentGmm(err.to_string()))
    }
}

/// Index of the first Gaussian of each GMM
fn gmm_map(gauss_counts: &[usize]) -> Vec<usize> {
    gauss_counts
        .iter()
        .scan(0, |start, &count| {
            let first = *start;
            *start += count;
            Some(first)
        })
        .collect()
}

//! Gaussian-process regression with a Matérn 5/2 kernel plus white noise.
//!
//! The kernel is `k(a, b) = m(|a - b| / l) + σ²·[a == b]` where
//! `m(d) = (1 + √5 d + 5/3 d²) exp(-√5 d)`. Targets are standardized before
//! fitting and predictions are mapped back to the original scale. With
//! [`GpConfig::optimize`] set, `l` and `σ²` start from the configured values
//! and are tuned on every fit by maximizing the log marginal likelihood.

use lb_types::{LbResult, NormalizedPoint, SurrogateError};
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

use crate::likelihood;

/// Diagonal jitter added to the training covariance for numerical stability.
const JITTER: f64 = 1e-10;

/// Kernel and target-scaling settings for the surrogate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpConfig {
    /// Isotropic Matérn length scale, in normalized units.
    pub length_scale: f64,
    /// White-noise variance added on the training diagonal and to the
    /// predictive variance.
    pub noise_level: f64,
    /// Center and scale targets by their mean and standard deviation.
    pub normalize_y: bool,
    /// Tune `length_scale` and `noise_level` by marginal likelihood on each
    /// fit; the configured values are the starting point.
    pub optimize: bool,
}

impl Default for GpConfig {
    fn default() -> Self {
        Self {
            length_scale: 0.5,
            noise_level: 1e-4,
            normalize_y: true,
            optimize: true,
        }
    }
}

impl GpConfig {
    pub fn validate(&self) -> LbResult<()> {
        if !(self.length_scale.is_finite() && self.length_scale > 0.0) {
            return Err(lb_types::config_error!(
                "gp.length_scale must be positive, got {}",
                self.length_scale
            ));
        }
        if !(self.noise_level.is_finite() && self.noise_level >= 0.0) {
            return Err(lb_types::config_error!(
                "gp.noise_level must be non-negative, got {}",
                self.noise_level
            ));
        }
        Ok(())
    }
}

/// Matérn ν = 5/2 correlation between two points (unit amplitude).
pub fn matern52(a: &[f64], b: &[f64], length_scale: f64) -> f64 {
    let r_sq: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let d = (x - y) / length_scale;
            d * d
        })
        .sum();
    let sqrt5_r = (5.0 * r_sq).sqrt();
    (1.0 + sqrt5_r + 5.0 / 3.0 * r_sq) * (-sqrt5_r).exp()
}

/// Derivative of [`matern52`] with respect to `ln(length_scale)`.
pub(crate) fn matern52_dlog_length_scale(a: &[f64], b: &[f64], length_scale: f64) -> f64 {
    let r_sq: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let d = (x - y) / length_scale;
            d * d
        })
        .sum();
    let sqrt5_r = (5.0 * r_sq).sqrt();
    5.0 / 3.0 * r_sq * (1.0 + sqrt5_r) * (-sqrt5_r).exp()
}

/// Cholesky factor of `K + (σ² + jitter) I` and `α = (K + σ²I)^-1 y`.
pub(crate) fn factorize(
    x: &[NormalizedPoint],
    y: &DVector<f64>,
    length_scale: f64,
    noise_level: f64,
) -> Option<(Cholesky<f64, Dyn>, DVector<f64>)> {
    let n = x.len();
    let diag = noise_level + JITTER;
    let k = DMatrix::from_fn(n, n, |i, j| {
        let base = matern52(&x[i], &x[j], length_scale);
        if i == j {
            base + diag
        } else {
            base
        }
    });
    let chol = k.cholesky()?;
    let alpha = chol.solve(y);
    Some((chol, alpha))
}

/// `ln p(y | X) = -½ yᵀα - Σ ln L_ii - n/2 ln 2π`.
pub(crate) fn log_marginal_likelihood(
    chol: &Cholesky<f64, Dyn>,
    alpha: &DVector<f64>,
    y: &DVector<f64>,
) -> f64 {
    let n = y.len() as f64;
    let half_log_det: f64 = chol.l_dirty().diagonal().iter().map(|v| v.ln()).sum();
    -0.5 * y.dot(alpha) - half_log_det - 0.5 * n * (2.0 * std::f64::consts::PI).ln()
}

/// Posterior mean and standard deviation at one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub mean: f64,
    pub std: f64,
}

/// A fitted GP ready for predictions.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    length_scale: f64,
    noise_level: f64,
    log_marginal_likelihood: f64,
    x_train: Vec<NormalizedPoint>,
    /// Lower Cholesky factor of `K + (σ² + jitter) I`.
    chol_l: DMatrix<f64>,
    /// `(K + σ²I)^-1 y_standardized`.
    alpha: DVector<f64>,
    y_mean: f64,
    y_std: f64,
}

impl GaussianProcess {
    /// Fit on training inputs `x` (rows in the unit cube) and targets `y`.
    pub fn fit(
        x: &[NormalizedPoint],
        y: &[f64],
        config: GpConfig,
    ) -> Result<Self, SurrogateError> {
        let n = y.len();
        if n == 0 || x.len() != n {
            return Err(SurrogateError::Empty);
        }

        let (y_mean, y_std) = if config.normalize_y {
            let mean = y.iter().sum::<f64>() / n as f64;
            let var = y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
            let std = var.sqrt();
            // Constant targets keep unit scale.
            (mean, if std < 10.0 * f64::EPSILON { 1.0 } else { std })
        } else {
            (0.0, 1.0)
        };
        let y_standardized = DVector::from_iterator(n, y.iter().map(|v| (v - y_mean) / y_std));

        let (length_scale, noise_level) = if config.optimize {
            likelihood::tune(x, &y_standardized, config.length_scale, config.noise_level)
        } else {
            (config.length_scale, config.noise_level)
        };
        let (chol, alpha) = factorize(x, &y_standardized, length_scale, noise_level)
            .ok_or(SurrogateError::NotPositiveDefinite { observations: n })?;
        let log_marginal_likelihood = log_marginal_likelihood(&chol, &alpha, &y_standardized);
        let chol_l = chol.l();

        Ok(Self {
            length_scale,
            noise_level,
            log_marginal_likelihood,
            x_train: x.to_vec(),
            chol_l,
            alpha,
            y_mean,
            y_std,
        })
    }

    /// Posterior mean and standard deviation at `point`, in target units.
    pub fn predict(&self, point: &[f64]) -> Prediction {
        let n = self.x_train.len();
        let ls = self.length_scale;
        let k_star = DVector::from_fn(n, |i, _| matern52(point, &self.x_train[i], ls));

        let mean = k_star.dot(&self.alpha) * self.y_std + self.y_mean;

        let prior_var = 1.0 + self.noise_level;
        let explained = self
            .chol_l
            .solve_lower_triangular(&k_star)
            .map_or(0.0, |v| v.norm_squared());
        let var = (prior_var - explained).max(0.0);

        Prediction {
            mean,
            std: var.sqrt() * self.y_std,
        }
    }

    pub fn predict_many(&self, points: &[NormalizedPoint]) -> Vec<Prediction> {
        points.iter().map(|p| self.predict(p)).collect()
    }

    pub fn n_train(&self) -> usize {
        self.x_train.len()
    }

    /// Length scale the model was fit with.
    pub fn length_scale(&self) -> f64 {
        self.length_scale
    }

    pub fn noise_level(&self) -> f64 {
        self.noise_level
    }

    /// Log marginal likelihood of the standardized targets.
    pub fn log_marginal_likelihood(&self) -> f64 {
        self.log_marginal_likelihood
    }
}

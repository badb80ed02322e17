//! Type-II maximum likelihood for the GP kernel hyperparameters.
//!
//! Minimizes the negative log marginal likelihood over
//! `θ = (ln length_scale, ln noise_level)` with L-BFGS. Both settings are
//! confined to [`HYPERPARAMETER_BOUNDS`] by clamping, and a single start is
//! used.

use argmin::core::{CostFunction, Executor, Gradient, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use lb_types::NormalizedPoint;
use nalgebra::DVector;
use tracing::debug;

use crate::gp::{factorize, log_marginal_likelihood, matern52_dlog_length_scale};

/// Search range for both the length scale and the noise level.
pub const HYPERPARAMETER_BOUNDS: (f64, f64) = (1e-5, 1e5);

const MAX_ITERS: u64 = 50;
const HISTORY: usize = 7;
const GRAD_TOLERANCE: f64 = 1e-6;

fn log_bounds() -> (f64, f64) {
    (HYPERPARAMETER_BOUNDS.0.ln(), HYPERPARAMETER_BOUNDS.1.ln())
}

fn clamp(theta: &[f64]) -> [f64; 2] {
    let (lo, hi) = log_bounds();
    let at = |i: usize| theta.get(i).copied().unwrap_or(lo).clamp(lo, hi);
    [at(0), at(1)]
}

/// Negative log marginal likelihood of standardized targets.
struct NegLogLikelihood<'a> {
    x: &'a [NormalizedPoint],
    y: &'a DVector<f64>,
}

impl CostFunction for NegLogLikelihood<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, theta: &Self::Param) -> Result<f64, argmin::core::Error> {
        let [log_ls, log_noise] = clamp(theta);
        let (chol, alpha) = factorize(self.x, self.y, log_ls.exp(), log_noise.exp())
            .ok_or_else(|| argmin::core::Error::msg("covariance is not positive definite"))?;
        Ok(-log_marginal_likelihood(&chol, &alpha, self.y))
    }
}

impl Gradient for NegLogLikelihood<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    /// `-½ tr((ααᵀ - K⁻¹) ∂K/∂θ)` for each component of `θ`.
    fn gradient(&self, theta: &Self::Param) -> Result<Vec<f64>, argmin::core::Error> {
        let clamped = clamp(theta);
        let (ls, noise) = (clamped[0].exp(), clamped[1].exp());
        let (chol, alpha) = factorize(self.x, self.y, ls, noise)
            .ok_or_else(|| argmin::core::Error::msg("covariance is not positive definite"))?;
        let k_inv = chol.inverse();

        let n = self.x.len();
        let mut d_ls = 0.0;
        let mut d_noise = 0.0;
        for i in 0..n {
            d_noise += alpha[i] * alpha[i] - k_inv[(i, i)];
            for j in 0..n {
                if i != j {
                    let w = alpha[i] * alpha[j] - k_inv[(i, j)];
                    d_ls += w * matern52_dlog_length_scale(&self.x[i], &self.x[j], ls);
                }
            }
        }
        let mut g = vec![-0.5 * d_ls, -0.5 * noise * d_noise];

        // Zero components that push further past a bound.
        const EPS: f64 = 1e-12;
        let (lo, hi) = log_bounds();
        for (gi, &t) in g.iter_mut().zip(clamped.iter()) {
            if (t <= lo + EPS && *gi > 0.0) || (t >= hi - EPS && *gi < 0.0) {
                *gi = 0.0;
            }
        }
        Ok(g)
    }
}

fn minimize(
    problem: NegLogLikelihood<'_>,
    start: Vec<f64>,
) -> Result<(f64, f64, f64), argmin::core::Error> {
    let solver =
        LBFGS::new(MoreThuenteLineSearch::new(), HISTORY).with_tolerance_grad(GRAD_TOLERANCE)?;
    let res = Executor::new(problem, solver)
        .configure(|state| state.param(start).max_iters(MAX_ITERS))
        .run()?;
    let state = res.state();
    let best = state
        .get_best_param()
        .ok_or_else(|| argmin::core::Error::msg("no best parameters found"))?;
    let [log_ls, log_noise] = clamp(best);
    Ok((log_ls.exp(), log_noise.exp(), -state.get_best_cost()))
}

/// Tuned `(length_scale, noise_level)` for the standardized targets `y`.
///
/// Falls back to the starting values when the solver fails or does not
/// improve on them.
pub(crate) fn tune(
    x: &[NormalizedPoint],
    y: &DVector<f64>,
    length_scale: f64,
    noise_level: f64,
) -> (f64, f64) {
    let initial = factorize(x, y, length_scale, noise_level)
        .map(|(chol, alpha)| log_marginal_likelihood(&chol, &alpha, y));
    let start = clamp(&[
        length_scale.ln(),
        noise_level.max(HYPERPARAMETER_BOUNDS.0).ln(),
    ])
    .to_vec();

    match minimize(NegLogLikelihood { x, y }, start) {
        Ok((ls, noise, lml)) if lml.is_finite() && initial.map_or(true, |init| lml > init) => {
            debug!(
                length_scale = ls,
                noise_level = noise,
                log_marginal_likelihood = lml,
                "gp hyperparameters tuned"
            );
            (ls, noise)
        }
        Ok(_) => {
            debug!("marginal likelihood did not improve; keeping configured hyperparameters");
            (length_scale, noise_level)
        }
        Err(e) => {
            debug!(error = %e, "hyperparameter search failed; keeping configured values");
            (length_scale, noise_level)
        }
    }
}

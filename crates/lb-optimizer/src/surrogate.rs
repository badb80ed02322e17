//! Surrogate model: accumulated observations plus GP/UCB candidate selection.

use lb_types::{LbError, LbResult, NormalizedPoint};
use rand::Rng;
use tracing::debug;

use crate::acquisition::UpperConfidenceBound;
use crate::design::uniform_unit_point;
use crate::gp::{GaussianProcess, GpConfig};

/// Default exploration coefficient for UCB.
pub const DEFAULT_BETA: f64 = 2.0;
/// Default number of random candidates scored per suggestion.
pub const DEFAULT_CANDIDATES: usize = 256;

/// Observations in normalized space and the model built from them.
///
/// The GP is refit from scratch on every [`Surrogate::suggest`] call.
#[derive(Debug, Clone)]
pub struct Surrogate {
    dim: usize,
    x: Vec<NormalizedPoint>,
    y: Vec<f64>,
    gp_config: GpConfig,
    acquisition: UpperConfidenceBound,
    fits: usize,
}

impl Surrogate {
    pub fn new(dim: usize, gp_config: GpConfig, beta: f64) -> Self {
        Self {
            dim,
            x: Vec::new(),
            y: Vec::new(),
            gp_config,
            acquisition: UpperConfidenceBound::new(beta),
            fits: 0,
        }
    }

    pub fn with_defaults(dim: usize) -> Self {
        Self::new(dim, GpConfig::default(), DEFAULT_BETA)
    }

    /// Append one observation.
    pub fn observe(&mut self, x: NormalizedPoint, objective: f64) -> LbResult<()> {
        if x.len() != self.dim {
            return Err(LbError::DimensionMismatch {
                expected: self.dim,
                actual: x.len(),
            });
        }
        self.x.push(x);
        self.y.push(objective);
        Ok(())
    }

    /// Number of observations needed before the GP is fit.
    pub fn warm_threshold(&self) -> usize {
        self.dim + 1
    }

    pub fn is_warm(&self) -> bool {
        self.y.len() >= self.warm_threshold()
    }

    /// Propose the next point in normalized space.
    ///
    /// Below `dim + 1` observations this is a uniform random point and no
    /// model is fit. Otherwise the GP is fit on all observations and the UCB
    /// argmax over `n_candidates` uniform random points is returned.
    pub fn suggest<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        n_candidates: usize,
    ) -> LbResult<NormalizedPoint> {
        if !self.is_warm() {
            debug!(
                observations = self.y.len(),
                needed = self.warm_threshold(),
                "cold start: sampling uniformly"
            );
            return Ok(uniform_unit_point(self.dim, rng));
        }

        let gp = self.fit()?;

        let mut candidates: Vec<NormalizedPoint> = (0..n_candidates)
            .map(|_| uniform_unit_point(self.dim, rng))
            .collect();
        let predictions = gp.predict_many(&candidates);

        let best = self.acquisition.select(&predictions).ok_or_else(|| {
            lb_types::config_error!("no scorable candidates among {n_candidates}")
        })?;

        debug!(
            observations = self.y.len(),
            candidate = best,
            ucb = self.acquisition.score(&predictions[best]),
            "surrogate suggestion"
        );

        Ok(candidates.swap_remove(best))
    }

    /// Fit the GP on everything observed so far.
    pub fn fit(&mut self) -> LbResult<GaussianProcess> {
        self.fits += 1;
        Ok(GaussianProcess::fit(&self.x, &self.y, self.gp_config)?)
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// How many times the GP has been fit.
    pub fn fit_count(&self) -> usize {
        self.fits
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn beta(&self) -> f64 {
        self.acquisition.beta
    }

    pub fn observations(&self) -> impl Iterator<Item = (&[f64], f64)> {
        self.x.iter().map(Vec::as_slice).zip(self.y.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn cold_start_returns_unit_point_without_fitting() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut surrogate = Surrogate::with_defaults(3);
        for i in 0..3 {
            let p = surrogate.suggest(&mut rng, DEFAULT_CANDIDATES).unwrap();
            assert_eq!(p.len(), 3);
            assert!(p.iter().all(|c| (0.0..=1.0).contains(c)));
            surrogate.observe(p, 1e9 * i as f64).unwrap();
        }
        assert_eq!(surrogate.fit_count(), 0);
        assert!(!surrogate.is_warm());
    }

    #[test]
    fn cold_start_ignores_objective_magnitude() {
        let run = |scale: f64| {
            let mut rng = ChaCha8Rng::seed_from_u64(9);
            let mut surrogate = Surrogate::with_defaults(2);
            surrogate.observe(vec![0.5, 0.5], scale).unwrap();
            surrogate.suggest(&mut rng, 64).unwrap()
        };
        assert_eq!(run(1.0), run(-1e12));
    }

    #[test]
    fn warm_surrogate_fits_each_suggestion() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut surrogate = Surrogate::with_defaults(1);
        surrogate.observe(vec![0.1], 0.0).unwrap();
        surrogate.observe(vec![0.9], 1.0).unwrap();

        surrogate.suggest(&mut rng, 32).unwrap();
        surrogate.suggest(&mut rng, 32).unwrap();
        assert_eq!(surrogate.fit_count(), 2);
    }

    #[test]
    fn exploitation_moves_toward_the_peak() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut surrogate = Surrogate::new(1, GpConfig::default(), 0.0);
        for &x in &[0.0, 0.2, 0.4, 0.6, 0.8, 1.0] {
            let f: f64 = -(x - 0.7) * (x - 0.7);
            surrogate.observe(vec![x], f).unwrap();
        }
        let next = surrogate.suggest(&mut rng, 512).unwrap();
        assert!((next[0] - 0.7).abs() < 0.15, "suggested {}", next[0]);
    }

    #[test]
    fn observe_rejects_wrong_dimension() {
        let mut surrogate = Surrogate::with_defaults(2);
        assert!(matches!(
            surrogate.observe(vec![0.1], 1.0),
            Err(LbError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(surrogate.is_empty());
    }

    #[test]
    fn zero_candidates_is_an_error_once_warm() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut surrogate = Surrogate::with_defaults(1);
        surrogate.observe(vec![0.1], 0.0).unwrap();
        surrogate.observe(vec![0.9], 1.0).unwrap();
        assert!(surrogate.suggest(&mut rng, 0).is_err());
    }
}

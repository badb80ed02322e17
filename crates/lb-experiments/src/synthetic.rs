//! Hardware-free objective for exercising the optimizer.

use lb_types::{EvaluationError, Experiment, LbResult, ParameterSpace, PhysicalPoint};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Shape of the synthetic response surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub amp_peak: f64,
    pub amp_width: f64,
    pub freq_peak: f64,
    pub freq_width: f64,
    /// Standard deviation of the additive measurement noise.
    pub noise_std: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            amp_peak: 2.2,
            amp_width: 0.8,
            freq_peak: 420.0,
            freq_width: 180.0,
            noise_std: 0.01,
            seed: 0,
        }
    }
}

impl SyntheticConfig {
    pub fn validate(&self) -> LbResult<()> {
        if !(self.amp_width > 0.0 && self.freq_width > 0.0) {
            return Err(lb_types::config_error!(
                "synthetic widths must be positive (amp {}, freq {})",
                self.amp_width,
                self.freq_width
            ));
        }
        if !(self.noise_std.is_finite() && self.noise_std >= 0.0) {
            return Err(lb_types::config_error!(
                "synthetic noise_std must be >= 0, got {}",
                self.noise_std
            ));
        }
        Ok(())
    }
}

/// A separable Gaussian bump over `noise_amp ∈ [0, 5]` and
/// `noise_freq ∈ [0, 1000]`, peaking at 1.0 before noise.
#[derive(Debug, Clone)]
pub struct SyntheticExperiment {
    config: SyntheticConfig,
    space: ParameterSpace,
    noise: Normal<f64>,
    rng: ChaCha8Rng,
}

impl SyntheticExperiment {
    pub fn new(config: SyntheticConfig) -> LbResult<Self> {
        config.validate()?;
        let space =
            ParameterSpace::from_bounds([("noise_amp", 0.0, 5.0), ("noise_freq", 0.0, 1000.0)])?;
        let noise = Normal::new(0.0, config.noise_std)
            .map_err(|e| lb_types::config_error!("synthetic noise: {e}"))?;
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            space,
            noise,
            rng,
        })
    }

    /// Noise-free value of the surface.
    pub fn expected(&self, amp: f64, freq: f64) -> f64 {
        let c = &self.config;
        let za = (amp - c.amp_peak) / c.amp_width;
        let zf = (freq - c.freq_peak) / c.freq_width;
        (-0.5 * za * za).exp() * (-0.5 * zf * zf).exp()
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }
}

impl Experiment for SyntheticExperiment {
    fn parameter_space(&self) -> &ParameterSpace {
        &self.space
    }

    fn evaluate(&mut self, params: &PhysicalPoint) -> Result<f64, EvaluationError> {
        let amp = params.require("noise_amp")?;
        let freq = params.require("noise_freq")?;
        Ok(self.expected(amp, freq) + self.noise.sample(&mut self.rng))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

//! RF amplitude → optical power loopback.
//!
//! An RF source drives an acousto-optic modulator; a photodiode on an ADC
//! channel reports the transmitted light. Each evaluation sets the RF
//! amplitude, waits for the light to settle, averages a number of ADC reads,
//! and converts the mean voltage to optical power through a linear
//! calibration. The objective is `-(power - target)²`.

use lb_types::{
    EvaluationError, Experiment, LbResult, ParameterSpace, PhysicalPoint, RecordingExperiment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calibration::PhotodiodeCalibration;
use crate::devices::{settle, Adc, RfSource, RfTone, ADC_CHANNELS};

const MIN_FREQUENCY_HZ: f64 = 1e6;
const MAX_FREQUENCY_HZ: f64 = 400e6;
const MAX_AVERAGES: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RfPowerConfig {
    pub parameter_name: String,
    pub amplitude_bounds: (f64, f64),
    pub adc_channel: usize,
    pub adc_gain_mu: u8,
    pub rf_frequency_hz: f64,
    pub rf_phase_turns: f64,
    pub target_power_nw: f64,
    pub calibration: PhotodiodeCalibration,
    pub settle_time_ms: f64,
    pub adc_averages: usize,
}

impl Default for RfPowerConfig {
    fn default() -> Self {
        Self {
            parameter_name: "urukul_amplitude".into(),
            amplitude_bounds: (0.05, 0.95),
            adc_channel: 0,
            adc_gain_mu: 0,
            rf_frequency_hz: 80e6,
            rf_phase_turns: 0.0,
            target_power_nw: 1000.0,
            calibration: PhotodiodeCalibration::default(),
            settle_time_ms: 1.0,
            adc_averages: 8,
        }
    }
}

impl RfPowerConfig {
    pub fn validate(&self) -> LbResult<()> {
        if self.parameter_name.trim().is_empty() {
            return Err(lb_types::config_error!("parameter_name must not be empty"));
        }
        let (low, high) = self.amplitude_bounds;
        if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) {
            return Err(lb_types::config_error!(
                "amplitude bounds [{low}, {high}] must lie within [0, 1]"
            ));
        }
        if self.adc_channel >= ADC_CHANNELS {
            return Err(lb_types::config_error!(
                "adc_channel {} out of range (0..{ADC_CHANNELS})",
                self.adc_channel
            ));
        }
        if self.adc_gain_mu > 3 {
            return Err(lb_types::config_error!(
                "adc_gain_mu must be in 0..=3, got {}",
                self.adc_gain_mu
            ));
        }
        if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&self.rf_frequency_hz) {
            return Err(lb_types::config_error!(
                "rf_frequency_hz {} outside [{MIN_FREQUENCY_HZ}, {MAX_FREQUENCY_HZ}]",
                self.rf_frequency_hz
            ));
        }
        if !(0.0..=1.0).contains(&self.rf_phase_turns) {
            return Err(lb_types::config_error!(
                "rf_phase_turns {} outside [0, 1]",
                self.rf_phase_turns
            ));
        }
        if !(0.0..=1e9).contains(&self.target_power_nw) {
            return Err(lb_types::config_error!(
                "target_power_nw {} outside [0, 1e9]",
                self.target_power_nw
            ));
        }
        if !(self.settle_time_ms.is_finite() && self.settle_time_ms >= 0.0) {
            return Err(lb_types::config_error!(
                "settle_time_ms must be >= 0, got {}",
                self.settle_time_ms
            ));
        }
        if !(1..=MAX_AVERAGES).contains(&self.adc_averages) {
            return Err(lb_types::config_error!(
                "adc_averages must be in 1..={MAX_AVERAGES}, got {}",
                self.adc_averages
            ));
        }
        self.calibration.validate()
    }
}

/// One averaged photodiode reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerMeasurement {
    pub amplitude: f64,
    pub photodiode_v: f64,
    pub optical_power_nw: f64,
    pub objective: f64,
}

#[derive(Debug)]
pub struct RfPowerExperiment<R, A> {
    config: RfPowerConfig,
    space: ParameterSpace,
    rf: R,
    adc: A,
    prepared: bool,
}

impl<R: RfSource, A: Adc> RfPowerExperiment<R, A> {
    pub fn new(config: RfPowerConfig, rf: R, adc: A) -> LbResult<Self> {
        config.validate()?;
        let (low, high) = config.amplitude_bounds;
        let space = ParameterSpace::from_bounds([(config.parameter_name.clone(), low, high)])?;
        Ok(Self {
            config,
            space,
            rf,
            adc,
            prepared: false,
        })
    }

    pub fn config(&self) -> &RfPowerConfig {
        &self.config
    }

    pub fn rf(&self) -> &R {
        &self.rf
    }

    pub fn adc(&self) -> &A {
        &self.adc
    }

    /// Mean of `adc_averages` consecutive reads.
    fn read_photodiode(&mut self) -> Result<f64, EvaluationError> {
        let n = self.config.adc_averages;
        let mut sum = 0.0;
        for _ in 0..n {
            sum += self.adc.read(self.config.adc_channel)?;
        }
        Ok(sum / n as f64)
    }

    pub fn measure_once(&mut self, amplitude: f64) -> Result<PowerMeasurement, EvaluationError> {
        if !self.prepared {
            return Err(EvaluationError::NotPrepared {
                message: "call prepare() before measuring".into(),
            });
        }
        let amplitude = amplitude.clamp(0.0, 1.0);
        self.rf.set_tone(RfTone {
            frequency_hz: self.config.rf_frequency_hz,
            phase_turns: self.config.rf_phase_turns,
            amplitude,
        })?;
        self.rf.set_output(true)?;
        settle(self.config.settle_time_ms);

        let photodiode_v = self.read_photodiode()?;
        let optical_power_nw = self.config.calibration.to_power_nw(photodiode_v);
        let error = optical_power_nw - self.config.target_power_nw;
        let result = PowerMeasurement {
            amplitude,
            photodiode_v,
            optical_power_nw,
            objective: -error * error,
        };
        debug!(
            amplitude,
            photodiode_v,
            optical_power_nw,
            objective = result.objective,
            "rf power measurement"
        );
        Ok(result)
    }
}

impl<R: RfSource, A: Adc> Experiment for RfPowerExperiment<R, A> {
    fn parameter_space(&self) -> &ParameterSpace {
        &self.space
    }

    fn prepare(&mut self) -> Result<(), EvaluationError> {
        self.rf.init()?;
        self.rf.set_output(false)?;
        self.adc.init()?;
        self.adc
            .set_gain(self.config.adc_channel, self.config.adc_gain_mu)?;
        self.prepared = true;
        debug!(
            rf = self.rf.name(),
            adc = self.adc.name(),
            "rf power loopback prepared"
        );
        Ok(())
    }

    fn evaluate(&mut self, params: &PhysicalPoint) -> Result<f64, EvaluationError> {
        self.evaluate_and_record(params).map(|m| m.objective)
    }

    fn name(&self) -> &str {
        "rf_power_loopback"
    }
}

impl<R: RfSource, A: Adc> RecordingExperiment for RfPowerExperiment<R, A> {
    type Record = PowerMeasurement;

    fn evaluate_and_record(
        &mut self,
        params: &PhysicalPoint,
    ) -> Result<PowerMeasurement, EvaluationError> {
        let amplitude = params.require(&self.config.parameter_name)?;
        self.measure_once(amplitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{rf_photodiode_bench, PhotodiodeBenchConfig, SimulatedAdc, SimulatedRfSource};

    fn quick() -> RfPowerConfig {
        RfPowerConfig {
            settle_time_ms: 0.0,
            adc_averages: 4,
            ..Default::default()
        }
    }

    fn experiment(config: RfPowerConfig) -> RfPowerExperiment<SimulatedRfSource, SimulatedAdc> {
        let (rf, adc) = rf_photodiode_bench(&PhotodiodeBenchConfig::default());
        RfPowerExperiment::new(config, rf, adc).unwrap()
    }

    #[test]
    fn prepare_leaves_output_off() {
        let mut exp = experiment(quick());
        exp.prepare().unwrap();
        assert!(!exp.rf().is_output_enabled());
    }

    #[test]
    fn measurement_converts_and_scores_power() {
        let mut exp = experiment(quick());
        exp.prepare().unwrap();
        // sin²(π/4) × 2000 nW = 1000 nW, read as 1 mV and calibrated back.
        let m = exp.measure_once(0.5).unwrap();
        assert!((m.photodiode_v - 1e-3).abs() < 1e-12);
        assert!((m.optical_power_nw - 1000.0).abs() < 1e-6);
        assert!(m.objective.abs() < 1e-6);
        assert!(exp.rf().is_output_enabled());
        assert_eq!(exp.adc().reads(), 4);

        let tone = exp.rf().last_tone().unwrap();
        assert_eq!(tone.frequency_hz, 80e6);
        assert_eq!(tone.amplitude, 0.5);
    }

    #[test]
    fn amplitude_is_clamped() {
        let mut exp = experiment(quick());
        exp.prepare().unwrap();
        let m = exp.measure_once(1.7).unwrap();
        assert_eq!(m.amplitude, 1.0);
        assert!((m.optical_power_nw - 2000.0).abs() < 1e-6);
    }

    #[test]
    fn requires_prepare() {
        let mut exp = experiment(quick());
        assert!(matches!(
            exp.measure_once(0.3),
            Err(EvaluationError::NotPrepared { .. })
        ));
    }

    #[test]
    fn parameter_name_is_configurable() {
        let config = RfPowerConfig {
            parameter_name: "aom_amp".into(),
            ..quick()
        };
        let mut exp = experiment(config);
        assert_eq!(exp.parameter_space().parameters()[0].name(), "aom_amp");
        exp.prepare().unwrap();
        assert!(exp
            .evaluate(&PhysicalPoint::new().with("aom_amp", 0.4))
            .is_ok());
        assert!(matches!(
            exp.evaluate(&PhysicalPoint::new().with("urukul_amplitude", 0.4)),
            Err(EvaluationError::MissingParameter { .. })
        ));
    }

    #[test]
    fn validates_hardware_arguments() {
        let cases = [
            RfPowerConfig {
                adc_averages: 0,
                ..quick()
            },
            RfPowerConfig {
                rf_frequency_hz: 500e6,
                ..quick()
            },
            RfPowerConfig {
                rf_frequency_hz: 1e5,
                ..quick()
            },
            RfPowerConfig {
                settle_time_ms: -0.5,
                ..quick()
            },
            RfPowerConfig {
                amplitude_bounds: (0.1, 1.2),
                ..quick()
            },
            RfPowerConfig {
                calibration: PhotodiodeCalibration {
                    gain_nw_per_v: -1.0,
                    ..Default::default()
                },
                ..quick()
            },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{config:?}");
        }
        assert!(quick().validate().is_ok());
    }

    #[test]
    fn optimizer_reaches_the_target_power() {
        let mut exp = experiment(quick());
        let config = lb_optimizer::RunConfig::new(4, 16, 123);
        let best = lb_optimizer::run(&mut exp, &config).unwrap();
        // Target power is reached at amplitude 0.5.
        let amplitude = best.params.unwrap().get("urukul_amplitude").unwrap();
        assert!((amplitude - 0.5).abs() < 0.15, "amplitude {amplitude}");
    }
}

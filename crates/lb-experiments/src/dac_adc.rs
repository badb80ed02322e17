//! DAC→ADC loopback: find the setpoint whose read-back hits a target voltage.

use lb_types::{
    EvaluationError, Experiment, LbResult, ParameterSpace, PhysicalPoint, RecordingExperiment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::devices::{settle, Adc, Dac, ADC_CHANNELS, DAC_CHANNELS, FULL_SCALE_V};

const PARAMETER: &str = "dac_voltage";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DacAdcConfig {
    pub dac_channel: usize,
    pub adc_channel: usize,
    pub target_voltage: f64,
    pub settle_time_ms: f64,
    pub adc_gain_mu: u8,
    /// Search range for the DAC setpoint, in volts.
    pub bounds: (f64, f64),
}

impl Default for DacAdcConfig {
    fn default() -> Self {
        Self {
            dac_channel: 0,
            adc_channel: 0,
            target_voltage: 2.5,
            settle_time_ms: 0.2,
            adc_gain_mu: 0,
            bounds: (-FULL_SCALE_V, FULL_SCALE_V),
        }
    }
}

impl DacAdcConfig {
    pub fn validate(&self) -> LbResult<()> {
        if self.dac_channel >= DAC_CHANNELS {
            return Err(lb_types::config_error!(
                "dac_channel {} out of range (0..{DAC_CHANNELS})",
                self.dac_channel
            ));
        }
        if self.adc_channel >= ADC_CHANNELS {
            return Err(lb_types::config_error!(
                "adc_channel {} out of range (0..{ADC_CHANNELS})",
                self.adc_channel
            ));
        }
        if !(self.settle_time_ms.is_finite() && self.settle_time_ms >= 0.0) {
            return Err(lb_types::config_error!(
                "settle_time_ms must be >= 0, got {}",
                self.settle_time_ms
            ));
        }
        if self.adc_gain_mu > 3 {
            return Err(lb_types::config_error!(
                "adc_gain_mu must be in 0..=3, got {}",
                self.adc_gain_mu
            ));
        }
        if !self.target_voltage.is_finite() {
            return Err(lb_types::config_error!("target_voltage must be finite"));
        }
        let (low, high) = self.bounds;
        if low < -FULL_SCALE_V || high > FULL_SCALE_V {
            return Err(lb_types::config_error!(
                "setpoint bounds [{low}, {high}] exceed ±{FULL_SCALE_V} V"
            ));
        }
        Ok(())
    }
}

/// One loopback reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    pub setpoint_v: f64,
    pub measured_v: f64,
    pub objective: f64,
}

/// Drives a DAC channel and scores how close the ADC read-back lands to
/// `target_voltage`: `-(measured - target)²`.
#[derive(Debug)]
pub struct DacAdcExperiment<D, A> {
    config: DacAdcConfig,
    space: ParameterSpace,
    dac: D,
    adc: A,
    prepared: bool,
}

impl<D: Dac, A: Adc> DacAdcExperiment<D, A> {
    pub fn new(config: DacAdcConfig, dac: D, adc: A) -> LbResult<Self> {
        config.validate()?;
        let (low, high) = config.bounds;
        let space = ParameterSpace::from_bounds([(PARAMETER, low, high)])?;
        Ok(Self {
            config,
            space,
            dac,
            adc,
            prepared: false,
        })
    }

    pub fn config(&self) -> &DacAdcConfig {
        &self.config
    }

    pub fn dac(&self) -> &D {
        &self.dac
    }

    pub fn adc(&self) -> &A {
        &self.adc
    }

    /// Write `setpoint_v` (clamped to full scale), settle, and sample.
    pub fn measure_once(&mut self, setpoint_v: f64) -> Result<MeasurementResult, EvaluationError> {
        if !self.prepared {
            return Err(EvaluationError::NotPrepared {
                message: "call prepare() before measuring".into(),
            });
        }
        let setpoint_v = setpoint_v.clamp(-FULL_SCALE_V, FULL_SCALE_V);
        self.dac.set_voltage(self.config.dac_channel, setpoint_v)?;
        settle(self.config.settle_time_ms);
        let measured_v = self.adc.read(self.config.adc_channel)?;

        let error = measured_v - self.config.target_voltage;
        let result = MeasurementResult {
            setpoint_v,
            measured_v,
            objective: -error * error,
        };
        debug!(
            setpoint_v,
            measured_v,
            objective = result.objective,
            "loopback measurement"
        );
        Ok(result)
    }
}

impl<D: Dac, A: Adc> Experiment for DacAdcExperiment<D, A> {
    fn parameter_space(&self) -> &ParameterSpace {
        &self.space
    }

    fn prepare(&mut self) -> Result<(), EvaluationError> {
        self.dac.init()?;
        self.adc.init()?;
        self.adc
            .set_gain(self.config.adc_channel, self.config.adc_gain_mu)?;
        self.prepared = true;
        debug!(
            dac = self.dac.name(),
            adc = self.adc.name(),
            "dac/adc loopback prepared"
        );
        Ok(())
    }

    fn evaluate(&mut self, params: &PhysicalPoint) -> Result<f64, EvaluationError> {
        self.evaluate_and_record(params).map(|m| m.objective)
    }

    fn name(&self) -> &str {
        "dac_adc_loopback"
    }
}

impl<D: Dac, A: Adc> RecordingExperiment for DacAdcExperiment<D, A> {
    type Record = MeasurementResult;

    fn evaluate_and_record(
        &mut self,
        params: &PhysicalPoint,
    ) -> Result<MeasurementResult, EvaluationError> {
        let setpoint = params.require(PARAMETER)?;
        self.measure_once(setpoint)
    }
}

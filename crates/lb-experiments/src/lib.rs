//! Experiments the LabBO optimizer can drive: a synthetic objective for
//! hardware-free runs, and instrument-backed objectives built on small device
//! traits (DAC, ADC, RF source) with simulated implementations for sandboxed
//! operation.

pub mod calibration;
pub mod dac_adc;
pub mod devices;
pub mod kind;
pub mod rf_power;
pub mod sim;
pub mod synthetic;

pub use calibration::PhotodiodeCalibration;
pub use dac_adc::{DacAdcConfig, DacAdcExperiment, MeasurementResult};
pub use devices::{Adc, Dac, DeviceError, DeviceResult, RfSource, RfTone};
pub use kind::ExperimentKind;
pub use rf_power::{PowerMeasurement, RfPowerConfig, RfPowerExperiment};
pub use sim::{
    dac_adc_loopback, rf_photodiode_bench, AnalogWire, LoopbackConfig, OpticalPath,
    PhotodiodeBenchConfig, SimulatedAdc, SimulatedDac, SimulatedRfSource,
};
pub use synthetic::{SyntheticConfig, SyntheticExperiment};

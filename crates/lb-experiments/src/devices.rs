//! Device abstractions for instrument-backed experiments.
//!
//! Implementations may drive real hardware or simulate it locally (see
//! [`crate::sim`]). All calls are blocking.

use lb_types::EvaluationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Output channels on a DAC card.
pub const DAC_CHANNELS: usize = 32;
/// Input channels on an ADC card.
pub const ADC_CHANNELS: usize = 8;
/// Full-scale voltage of both converters, in volts.
pub const FULL_SCALE_V: f64 = 10.0;

/// Errors surfaced by device operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("{device} used before init()")]
    NotInitialized { device: String },
    #[error("{device}: channel {channel} out of range (0..{channels})")]
    ChannelOutOfRange {
        device: String,
        channel: usize,
        channels: usize,
    },
    #[error("{device}: {quantity} {value} outside the supported range")]
    ValueOutOfRange {
        device: String,
        quantity: &'static str,
        value: f64,
    },
    #[error("{device} unavailable: {message}")]
    Unavailable { device: String, message: String },
}

impl DeviceError {
    pub fn device(&self) -> &str {
        match self {
            Self::NotInitialized { device }
            | Self::ChannelOutOfRange { device, .. }
            | Self::ValueOutOfRange { device, .. }
            | Self::Unavailable { device, .. } => device,
        }
    }
}

impl From<DeviceError> for EvaluationError {
    fn from(err: DeviceError) -> Self {
        EvaluationError::Device {
            device: err.device().to_string(),
            message: err.to_string(),
        }
    }
}

/// Result alias for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// A multi-channel digital-to-analog converter.
pub trait Dac: Send {
    fn name(&self) -> &str;

    fn init(&mut self) -> DeviceResult<()>;

    /// Drive `channel` to `volts`. Values beyond full scale are rejected.
    fn set_voltage(&mut self, channel: usize, volts: f64) -> DeviceResult<()>;
}

/// A multi-channel analog-to-digital converter.
pub trait Adc: Send {
    fn name(&self) -> &str;

    fn init(&mut self) -> DeviceResult<()>;

    /// Set the programmable-gain amplifier of `channel`, in machine units.
    fn set_gain(&mut self, channel: usize, gain_mu: u8) -> DeviceResult<()>;

    /// Take one sample of `channel`, in volts.
    fn read(&mut self, channel: usize) -> DeviceResult<f64>;
}

/// Frequency, phase, and amplitude of an RF output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RfTone {
    pub frequency_hz: f64,
    /// Phase in turns, `[0, 1]`.
    pub phase_turns: f64,
    /// Amplitude scale factor, `[0, 1]`.
    pub amplitude: f64,
}

/// A DDS-style RF source with an output switch.
pub trait RfSource: Send {
    fn name(&self) -> &str;

    fn init(&mut self) -> DeviceResult<()>;

    fn set_tone(&mut self, tone: RfTone) -> DeviceResult<()>;

    fn set_output(&mut self, enabled: bool) -> DeviceResult<()>;
}

/// Block for a settling period given in milliseconds.
pub(crate) fn settle(ms: f64) {
    if ms > 0.0 {
        std::thread::sleep(Duration::from_secs_f64(ms / 1000.0));
    }
}

pub(crate) fn check_channel(device: &str, channel: usize, channels: usize) -> DeviceResult<()> {
    if channel >= channels {
        return Err(DeviceError::ChannelOutOfRange {
            device: device.to_string(),
            channel,
            channels,
        });
    }
    Ok(())
}

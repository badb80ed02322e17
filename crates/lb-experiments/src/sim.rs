//! Simulated instruments for sandboxed runs.
//!
//! Devices that are wired together on a real bench share state here: a
//! [`SimulatedDac`] drives an [`AnalogWire`] that a [`SimulatedAdc`] samples,
//! and a [`SimulatedRfSource`] drives an [`OpticalPath`] read back through a
//! photodiode on an ADC channel.

use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::devices::{
    check_channel, Adc, Dac, DeviceError, DeviceResult, RfSource, RfTone, ADC_CHANNELS,
    DAC_CHANNELS, FULL_SCALE_V,
};

/// Voltages present on each DAC output line.
#[derive(Debug, Clone)]
pub struct AnalogWire {
    volts: Arc<Mutex<Vec<f64>>>,
}

impl AnalogWire {
    pub fn new(channels: usize) -> Self {
        Self {
            volts: Arc::new(Mutex::new(vec![0.0; channels])),
        }
    }

    pub fn drive(&self, channel: usize, volts: f64) {
        if let Some(line) = self.volts.lock().get_mut(channel) {
            *line = volts;
        }
    }

    pub fn level(&self, channel: usize) -> f64 {
        self.volts.lock().get(channel).copied().unwrap_or(0.0)
    }
}

impl Default for AnalogWire {
    fn default() -> Self {
        Self::new(DAC_CHANNELS)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct OpticalState {
    tone: Option<RfTone>,
    enabled: bool,
}

/// Light reaching the photodiode, controlled by an RF-driven modulator.
#[derive(Debug, Clone, Default)]
pub struct OpticalPath {
    state: Arc<Mutex<OpticalState>>,
}

impl OpticalPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of the available power transmitted, `sin²(π/2 · amplitude)`
    /// while the RF output is on, zero otherwise.
    pub fn transmission(&self) -> f64 {
        let state = *self.state.lock();
        match (state.enabled, state.tone) {
            (true, Some(tone)) => {
                let a = tone.amplitude.clamp(0.0, 1.0);
                (std::f64::consts::FRAC_PI_2 * a).sin().powi(2)
            }
            _ => 0.0,
        }
    }

    fn set_tone(&self, tone: RfTone) {
        self.state.lock().tone = Some(tone);
    }

    fn set_enabled(&self, enabled: bool) {
        self.state.lock().enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }
}

/// In-process DAC writing onto an [`AnalogWire`].
#[derive(Debug)]
pub struct SimulatedDac {
    name: String,
    wire: AnalogWire,
    initialized: bool,
    writes: usize,
}

impl SimulatedDac {
    pub fn new(name: impl Into<String>, wire: AnalogWire) -> Self {
        Self {
            name: name.into(),
            wire,
            initialized: false,
            writes: 0,
        }
    }

    /// Number of successful `set_voltage` calls.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl Dac for SimulatedDac {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self) -> DeviceResult<()> {
        self.initialized = true;
        debug!(device = %self.name, "dac initialized");
        Ok(())
    }

    fn set_voltage(&mut self, channel: usize, volts: f64) -> DeviceResult<()> {
        if !self.initialized {
            return Err(DeviceError::NotInitialized {
                device: self.name.clone(),
            });
        }
        check_channel(&self.name, channel, DAC_CHANNELS)?;
        if !(volts.is_finite() && volts.abs() <= FULL_SCALE_V) {
            return Err(DeviceError::ValueOutOfRange {
                device: self.name.clone(),
                quantity: "voltage",
                value: volts,
            });
        }
        self.wire.drive(channel, volts);
        self.writes += 1;
        Ok(())
    }
}

type SignalSource = Box<dyn FnMut(usize) -> f64 + Send>;

/// In-process ADC whose inputs come from a signal closure, with optional
/// Gaussian read noise and fault injection.
pub struct SimulatedAdc {
    name: String,
    initialized: bool,
    gains: Vec<u8>,
    source: SignalSource,
    noise: Option<(Normal<f64>, ChaCha8Rng)>,
    fail_after: Option<usize>,
    reads: usize,
}

impl SimulatedAdc {
    pub fn new(name: impl Into<String>, source: impl FnMut(usize) -> f64 + Send + 'static) -> Self {
        Self {
            name: name.into(),
            initialized: false,
            gains: vec![0; ADC_CHANNELS],
            source: Box::new(source),
            noise: None,
            fail_after: None,
            reads: 0,
        }
    }

    /// Add zero-mean Gaussian noise with standard deviation `std_v` volts.
    pub fn with_noise(mut self, std_v: f64, seed: u64) -> Self {
        self.noise = Normal::new(0.0, std_v)
            .ok()
            .filter(|_| std_v > 0.0)
            .map(|dist| (dist, ChaCha8Rng::seed_from_u64(seed)));
        self
    }

    /// Report the device as unavailable once `reads` samples have been taken.
    pub fn with_failure_after(mut self, reads: usize) -> Self {
        self.fail_after = Some(reads);
        self
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn gain(&self, channel: usize) -> Option<u8> {
        self.gains.get(channel).copied()
    }
}

impl fmt::Debug for SimulatedAdc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedAdc")
            .field("name", &self.name)
            .field("initialized", &self.initialized)
            .field("gains", &self.gains)
            .field("reads", &self.reads)
            .finish_non_exhaustive()
    }
}

impl Adc for SimulatedAdc {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self) -> DeviceResult<()> {
        self.initialized = true;
        debug!(device = %self.name, "adc initialized");
        Ok(())
    }

    fn set_gain(&mut self, channel: usize, gain_mu: u8) -> DeviceResult<()> {
        if !self.initialized {
            return Err(DeviceError::NotInitialized {
                device: self.name.clone(),
            });
        }
        check_channel(&self.name, channel, ADC_CHANNELS)?;
        if gain_mu > 3 {
            return Err(DeviceError::ValueOutOfRange {
                device: self.name.clone(),
                quantity: "gain",
                value: f64::from(gain_mu),
            });
        }
        self.gains[channel] = gain_mu;
        Ok(())
    }

    fn read(&mut self, channel: usize) -> DeviceResult<f64> {
        if !self.initialized {
            return Err(DeviceError::NotInitialized {
                device: self.name.clone(),
            });
        }
        check_channel(&self.name, channel, ADC_CHANNELS)?;
        if self.fail_after.is_some_and(|limit| self.reads >= limit) {
            return Err(DeviceError::Unavailable {
                device: self.name.clone(),
                message: format!("no response after {} reads", self.reads),
            });
        }

        let mut volts = (self.source)(channel);
        if let Some((dist, rng)) = self.noise.as_mut() {
            volts += dist.sample(rng);
        }
        // Each PGA step divides the input range by ten.
        let range = FULL_SCALE_V / 10f64.powi(i32::from(self.gains[channel]));
        self.reads += 1;
        Ok(volts.clamp(-range, range))
    }
}

/// In-process DDS channel driving an [`OpticalPath`].
#[derive(Debug)]
pub struct SimulatedRfSource {
    name: String,
    path: OpticalPath,
    initialized: bool,
    last_tone: Option<RfTone>,
}

impl SimulatedRfSource {
    pub fn new(name: impl Into<String>, path: OpticalPath) -> Self {
        Self {
            name: name.into(),
            path,
            initialized: false,
            last_tone: None,
        }
    }

    pub fn last_tone(&self) -> Option<RfTone> {
        self.last_tone
    }

    pub fn is_output_enabled(&self) -> bool {
        self.path.is_enabled()
    }
}

impl RfSource for SimulatedRfSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self) -> DeviceResult<()> {
        self.initialized = true;
        debug!(device = %self.name, "rf source initialized");
        Ok(())
    }

    fn set_tone(&mut self, tone: RfTone) -> DeviceResult<()> {
        if !self.initialized {
            return Err(DeviceError::NotInitialized {
                device: self.name.clone(),
            });
        }
        if !(0.0..=1.0).contains(&tone.amplitude) {
            return Err(DeviceError::ValueOutOfRange {
                device: self.name.clone(),
                quantity: "amplitude",
                value: tone.amplitude,
            });
        }
        if !(tone.frequency_hz > 0.0 && tone.frequency_hz <= 400e6) {
            return Err(DeviceError::ValueOutOfRange {
                device: self.name.clone(),
                quantity: "frequency",
                value: tone.frequency_hz,
            });
        }
        self.path.set_tone(tone);
        self.last_tone = Some(tone);
        Ok(())
    }

    fn set_output(&mut self, enabled: bool) -> DeviceResult<()> {
        if !self.initialized {
            return Err(DeviceError::NotInitialized {
                device: self.name.clone(),
            });
        }
        self.path.set_enabled(enabled);
        Ok(())
    }
}

/// A DAC output cabled straight into an ADC input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    pub dac_channel: usize,
    pub adc_channel: usize,
    /// Cable/buffer gain between the two cards.
    pub gain: f64,
    pub offset_v: f64,
    pub noise_std_v: f64,
    pub seed: u64,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            dac_channel: 0,
            adc_channel: 0,
            gain: 1.0,
            offset_v: 0.0,
            noise_std_v: 0.0,
            seed: 0,
        }
    }
}

/// Build a DAC and an ADC connected according to `config`.
pub fn dac_adc_loopback(config: &LoopbackConfig) -> (SimulatedDac, SimulatedAdc) {
    let wire = AnalogWire::default();
    let dac = SimulatedDac::new("zotino0", wire.clone());

    let (dac_channel, adc_channel) = (config.dac_channel, config.adc_channel);
    let (gain, offset) = (config.gain, config.offset_v);
    let adc = SimulatedAdc::new("sampler0", move |channel| {
        if channel == adc_channel {
            wire.level(dac_channel) * gain + offset
        } else {
            0.0
        }
    })
    .with_noise(config.noise_std_v, config.seed);

    (dac, adc)
}

/// An RF-driven modulator in front of a photodiode read by an ADC channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotodiodeBenchConfig {
    pub adc_channel: usize,
    /// Optical power at full transmission, in nW.
    pub max_power_nw: f64,
    pub responsivity_v_per_nw: f64,
    pub dark_voltage_v: f64,
    pub noise_std_v: f64,
    pub seed: u64,
}

impl Default for PhotodiodeBenchConfig {
    fn default() -> Self {
        Self {
            adc_channel: 0,
            max_power_nw: 2000.0,
            responsivity_v_per_nw: 1e-6,
            dark_voltage_v: 0.0,
            noise_std_v: 0.0,
            seed: 0,
        }
    }
}

/// Build an RF source and an ADC observing the light it modulates.
pub fn rf_photodiode_bench(config: &PhotodiodeBenchConfig) -> (SimulatedRfSource, SimulatedAdc) {
    let path = OpticalPath::new();
    let rf = SimulatedRfSource::new("urukul0_ch0", path.clone());

    let adc_channel = config.adc_channel;
    let scale = config.max_power_nw * config.responsivity_v_per_nw;
    let dark = config.dark_voltage_v;
    let adc = SimulatedAdc::new("suservo0", move |channel| {
        if channel == adc_channel {
            dark + scale * path.transmission()
        } else {
            0.0
        }
    })
    .with_noise(config.noise_std_v, config.seed);

    (rf, adc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_reads_back_the_driven_voltage() {
        let config = LoopbackConfig {
            dac_channel: 3,
            adc_channel: 1,
            gain: 0.5,
            offset_v: 0.1,
            ..Default::default()
        };
        let (mut dac, mut adc) = dac_adc_loopback(&config);
        dac.init().unwrap();
        adc.init().unwrap();

        dac.set_voltage(3, 4.0).unwrap();
        assert!((adc.read(1).unwrap() - 2.1).abs() < 1e-12);
        assert_eq!(adc.read(0).unwrap(), 0.0);
        assert_eq!(dac.writes(), 1);
        assert_eq!(adc.reads(), 2);
    }

    #[test]
    fn devices_require_init() {
        let (mut dac, mut adc) = dac_adc_loopback(&LoopbackConfig::default());
        assert!(matches!(
            dac.set_voltage(0, 1.0),
            Err(DeviceError::NotInitialized { .. })
        ));
        assert!(matches!(adc.read(0), Err(DeviceError::NotInitialized { .. })));
    }

    #[test]
    fn dac_rejects_bad_channel_and_voltage() {
        let (mut dac, _) = dac_adc_loopback(&LoopbackConfig::default());
        dac.init().unwrap();
        assert!(matches!(
            dac.set_voltage(DAC_CHANNELS, 1.0),
            Err(DeviceError::ChannelOutOfRange { .. })
        ));
        assert!(matches!(
            dac.set_voltage(0, 10.5),
            Err(DeviceError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn adc_gain_narrows_the_input_range() {
        let mut adc = SimulatedAdc::new("sampler0", |_| 5.0);
        adc.init().unwrap();
        assert_eq!(adc.read(0).unwrap(), 5.0);
        adc.set_gain(0, 1).unwrap();
        assert_eq!(adc.gain(0), Some(1));
        assert_eq!(adc.read(0).unwrap(), 1.0);
        assert!(adc.set_gain(0, 4).is_err());
    }

    #[test]
    fn adc_noise_is_seeded() {
        let sample = |seed| {
            let mut adc = SimulatedAdc::new("sampler0", |_| 1.0).with_noise(0.05, seed);
            adc.init().unwrap();
            (0..5).map(|_| adc.read(0).unwrap()).collect::<Vec<_>>()
        };
        assert_eq!(sample(4), sample(4));
        assert_ne!(sample(4), sample(5));
    }

    #[test]
    fn adc_fault_injection() {
        let mut adc = SimulatedAdc::new("sampler0", |_| 0.0).with_failure_after(2);
        adc.init().unwrap();
        assert!(adc.read(0).is_ok());
        assert!(adc.read(0).is_ok());
        assert!(matches!(adc.read(0), Err(DeviceError::Unavailable { .. })));
    }

    #[test]
    fn photodiode_follows_rf_amplitude_and_switch() {
        let (mut rf, mut adc) = rf_photodiode_bench(&PhotodiodeBenchConfig::default());
        rf.init().unwrap();
        adc.init().unwrap();

        rf.set_tone(RfTone {
            frequency_hz: 80e6,
            phase_turns: 0.0,
            amplitude: 0.5,
        })
        .unwrap();
        assert_eq!(adc.read(0).unwrap(), 0.0);

        rf.set_output(true).unwrap();
        // sin²(π/4) = 0.5 of 2000 nW at 1 µV/nW.
        assert!((adc.read(0).unwrap() - 1e-3).abs() < 1e-12);
        assert!(rf.is_output_enabled());
        assert_eq!(rf.last_tone().unwrap().amplitude, 0.5);
    }

    #[test]
    fn rf_source_rejects_out_of_range_tone() {
        let (mut rf, _) = rf_photodiode_bench(&PhotodiodeBenchConfig::default());
        rf.init().unwrap();
        let tone = RfTone {
            frequency_hz: 80e6,
            phase_turns: 0.0,
            amplitude: 1.2,
        };
        assert!(rf.set_tone(tone).is_err());
        let tone = RfTone {
            frequency_hz: 500e6,
            amplitude: 0.5,
            ..tone
        };
        assert!(rf.set_tone(tone).is_err());
    }
}

use lb_types::LbResult;
use serde::{Deserialize, Serialize};

/// Linear photodiode model: `power_nw = (volts - offset_v) * gain_nw_per_v`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotodiodeCalibration {
    pub offset_v: f64,
    pub gain_nw_per_v: f64,
}

impl Default for PhotodiodeCalibration {
    fn default() -> Self {
        Self {
            offset_v: 0.0,
            gain_nw_per_v: 1e6,
        }
    }
}

impl PhotodiodeCalibration {
    pub fn to_power_nw(&self, volts: f64) -> f64 {
        (volts - self.offset_v) * self.gain_nw_per_v
    }

    pub fn validate(&self) -> LbResult<()> {
        if !(-10.0..=10.0).contains(&self.offset_v) {
            return Err(lb_types::config_error!(
                "photodiode offset {} V outside [-10, 10]",
                self.offset_v
            ));
        }
        if !(0.0..=1e12).contains(&self.gain_nw_per_v) {
            return Err(lb_types::config_error!(
                "photodiode gain {} nW/V outside [0, 1e12]",
                self.gain_nw_per_v
            ));
        }
        Ok(())
    }
}

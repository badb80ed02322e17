//! Config-selected experiment variants.

use lb_types::{Experiment, LbResult};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dac_adc::{DacAdcConfig, DacAdcExperiment};
use crate::rf_power::{RfPowerConfig, RfPowerExperiment};
use crate::sim::{dac_adc_loopback, rf_photodiode_bench, LoopbackConfig, PhotodiodeBenchConfig};
use crate::synthetic::{SyntheticConfig, SyntheticExperiment};

/// Which experiment to run, tagged by `"kind"` in config files.
///
/// Instrument-backed variants are wired to simulated benches described by
/// their `bench` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExperimentKind {
    Synthetic(SyntheticConfig),
    DacAdcLoopback {
        #[serde(default)]
        experiment: DacAdcConfig,
        #[serde(default)]
        bench: LoopbackConfig,
    },
    RfPowerLoopback {
        #[serde(default)]
        experiment: RfPowerConfig,
        #[serde(default)]
        bench: PhotodiodeBenchConfig,
    },
}

impl Default for ExperimentKind {
    fn default() -> Self {
        Self::Synthetic(SyntheticConfig::default())
    }
}

impl ExperimentKind {
    pub fn build(&self) -> LbResult<Box<dyn Experiment + Send>> {
        let experiment: Box<dyn Experiment + Send> = match self {
            Self::Synthetic(config) => Box::new(SyntheticExperiment::new(config.clone())?),
            Self::DacAdcLoopback { experiment, bench } => {
                let (dac, adc) = dac_adc_loopback(bench);
                Box::new(DacAdcExperiment::new(experiment.clone(), dac, adc)?)
            }
            Self::RfPowerLoopback { experiment, bench } => {
                let (rf, adc) = rf_photodiode_bench(bench);
                Box::new(RfPowerExperiment::new(experiment.clone(), rf, adc)?)
            }
        };
        info!(
            experiment = experiment.name(),
            dims = experiment.parameter_space().dim(),
            "experiment built"
        );
        Ok(experiment)
    }
}

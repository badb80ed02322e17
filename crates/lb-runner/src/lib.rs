//! # lb-runner
//!
//! Loads a runner config, builds the selected experiment, and drives one
//! optimization run over it.

pub mod config;

use lb_optimizer::{Best, OptimizationRun, RunStatus, TrialRecord};
use lb_types::LbResult;
use serde::Serialize;
use std::path::Path;
use tracing::info;

pub use config::{config_path, RunnerConfig, CONFIG_ENV};

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub experiment: String,
    pub status: RunStatus,
    pub best: Best,
    #[serde(skip)]
    pub history: Vec<TrialRecord>,
}

/// Run the configured experiment to completion, writing the trial history if
/// `history_path` is set.
pub fn execute(config: &RunnerConfig) -> LbResult<RunReport> {
    let mut experiment = config.experiment.build()?;
    let mut run = OptimizationRun::new(experiment.parameter_space().clone(), config.run.clone())?;
    let best = run.execute(&mut experiment, None)?;

    let report = RunReport {
        experiment: experiment.name().to_string(),
        status: run.status().clone(),
        best,
        history: run.history().to_vec(),
    };
    if let Some(path) = &config.history_path {
        write_history(path, &report.history)?;
        info!(path = %path.display(), trials = report.history.len(), "history written");
    }
    Ok(report)
}

pub fn write_history(path: &Path, history: &[TrialRecord]) -> LbResult<()> {
    let json = serde_json::to_string_pretty(history)?;
    std::fs::write(path, json)?;
    Ok(())
}

//! Run configuration, trial records, and run status tracking.

use chrono::{DateTime, Utc};
use lb_types::{LbResult, PhysicalPoint};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gp::GpConfig;
use crate::surrogate::{DEFAULT_BETA, DEFAULT_CANDIDATES};

/// Unique optimization run identifier.
pub type RunId = Uuid;

/// Top-level configuration for an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Trials taken from the Latin-hypercube design before the surrogate
    /// takes over.
    pub init_trials: usize,

    /// Total number of trials, design trials included.
    pub max_trials: usize,

    /// Seed for the run's single random stream.
    pub seed: u64,

    /// Random candidates scored by the acquisition function per trial.
    pub n_candidates: usize,

    /// UCB exploration coefficient.
    pub beta: f64,

    pub gp: GpConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            init_trials: 5,
            max_trials: 30,
            seed: 123,
            n_candidates: DEFAULT_CANDIDATES,
            beta: DEFAULT_BETA,
            gp: GpConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn new(init_trials: usize, max_trials: usize, seed: u64) -> Self {
        Self {
            init_trials,
            max_trials,
            seed,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_trials(mut self, init_trials: usize, max_trials: usize) -> Self {
        self.init_trials = init_trials;
        self.max_trials = max_trials;
        self
    }

    pub fn with_candidates(mut self, n: usize) -> Self {
        self.n_candidates = n;
        self
    }

    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_gp(mut self, gp: GpConfig) -> Self {
        self.gp = gp;
        self
    }

    /// Reject configurations that would make the run degenerate.
    pub fn validate(&self) -> LbResult<()> {
        if self.init_trials == 0 {
            return Err(lb_types::config_error!("init_trials must be at least 1"));
        }
        if self.max_trials == 0 {
            return Err(lb_types::config_error!("max_trials must be at least 1"));
        }
        if self.n_candidates == 0 {
            return Err(lb_types::config_error!("n_candidates must be at least 1"));
        }
        if !(self.beta.is_finite() && self.beta >= 0.0) {
            return Err(lb_types::config_error!(
                "beta must be a non-negative number, got {}",
                self.beta
            ));
        }
        self.gp.validate()
    }
}

/// Where a trial's candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Precomputed Latin-hypercube point.
    Design,
    /// Surrogate suggestion (or its cold-start random fallback).
    Acquisition,
}

/// Telemetry for one completed trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub index: usize,
    pub objective: f64,
    pub params: PhysicalPoint,
    pub source: CandidateSource,
    pub completed_at: DateTime<Utc>,
}

/// The incumbent: best parameters seen so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Best {
    pub params: Option<PhysicalPoint>,
    pub objective: f64,
}

impl Default for Best {
    fn default() -> Self {
        Self {
            params: None,
            objective: f64::NEG_INFINITY,
        }
    }
}

impl Best {
    /// Replace the incumbent if `objective` is strictly better. Returns
    /// whether it was replaced.
    pub fn offer(&mut self, params: &PhysicalPoint, objective: f64) -> bool {
        if objective > self.objective {
            self.params = Some(params.clone());
            self.objective = objective;
            true
        } else {
            false
        }
    }
}

/// Lifecycle state for an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Aggregate status of an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub id: RunId,
    pub state: RunState,
    pub trials_completed: usize,
    pub best: Best,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RunStatus {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RunState::Pending,
            trials_completed: 0,
            best: Best::default(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Count a finished trial and update the incumbent.
    pub fn record_trial(&mut self, record: &TrialRecord) -> bool {
        self.trials_completed += 1;
        self.best.offer(&record.params, record.objective)
    }
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::new()
    }
}

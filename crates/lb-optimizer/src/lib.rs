//! # lb-optimizer
//!
//! Bayesian optimization over continuous parameter spaces for LabBO.
//!
//! Provides the Latin-hypercube seed design, a Gaussian-process surrogate (with
//! marginal-likelihood hyperparameter tuning) and upper-confidence-bound
//! acquisition, trial tracking, and the synchronous
//! optimization loop that drives an [`Experiment`](lb_types::Experiment).

mod acquisition;
mod design;
mod gp;
mod likelihood;
mod runner;
mod surrogate;
mod trial;

pub use acquisition::{argmax_first, UpperConfidenceBound};
pub use design::{latin_hypercube, latin_hypercube_unit, uniform_unit_point};
pub use gp::{matern52, GaussianProcess, GpConfig, Prediction};
pub use likelihood::HYPERPARAMETER_BOUNDS;
pub use runner::{run, run_with_stabilizer, OptimizationRun};
pub use surrogate::{Surrogate, DEFAULT_BETA, DEFAULT_CANDIDATES};
pub use trial::{Best, CandidateSource, RunConfig, RunId, RunState, RunStatus, TrialRecord};

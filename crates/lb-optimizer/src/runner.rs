//! The optimization loop.
//!
//! A run owns its random stream, seed design, surrogate observations, and
//! trial history. Trials execute strictly one after another; the loop blocks
//! on every evaluation and aborts on the first evaluator error.

use lb_types::{EvaluationError, Experiment, LbResult, ParameterSpace, PhysicalPoint};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info, warn};

use crate::design::latin_hypercube;
use crate::surrogate::Surrogate;
use crate::trial::{Best, CandidateSource, RunConfig, RunState, RunStatus, TrialRecord};

/// One optimization run over a fixed parameter space.
pub struct OptimizationRun {
    space: ParameterSpace,
    config: RunConfig,
    rng: ChaCha8Rng,
    design: Vec<PhysicalPoint>,
    surrogate: Surrogate,
    status: RunStatus,
    history: Vec<TrialRecord>,
}

impl OptimizationRun {
    /// Validate the configuration, seed the random stream, and precompute the
    /// Latin-hypercube design.
    pub fn new(space: ParameterSpace, config: RunConfig) -> LbResult<Self> {
        config.validate()?;
        if config.init_trials > config.max_trials {
            warn!(
                init_trials = config.init_trials,
                max_trials = config.max_trials,
                "more design points than trials; the surrogate will never be consulted"
            );
        }

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let design = latin_hypercube(&space, config.init_trials, &mut rng)?;
        let surrogate = Surrogate::new(space.dim(), config.gp, config.beta);

        Ok(Self {
            space,
            config,
            rng,
            design,
            surrogate,
            status: RunStatus::new(),
            history: Vec::new(),
        })
    }

    /// Run every trial against `experiment` and return the incumbent.
    ///
    /// The optional `stabilizer` is invoked with each candidate right before
    /// it is evaluated; an error from it aborts the run like an evaluator
    /// error. A run can be executed once.
    pub fn execute<E: Experiment + ?Sized>(
        &mut self,
        experiment: &mut E,
        stabilizer: Option<&mut dyn FnMut(&PhysicalPoint) -> Result<(), EvaluationError>>,
    ) -> LbResult<Best> {
        if self.status.state != RunState::Pending {
            return Err(lb_types::config_error!(
                "run {} has already been executed",
                self.status.id
            ));
        }

        self.status.mark_running();
        info!(
            run = %self.status.id,
            experiment = experiment.name(),
            dims = self.space.dim(),
            init_trials = self.config.init_trials,
            max_trials = self.config.max_trials,
            seed = self.config.seed,
            "optimization run started"
        );

        match self.drive(experiment, stabilizer) {
            Ok(()) => {
                self.status.mark_completed();
                let best = self.status.best.clone();
                info!(
                    "best found: objective={:.4} | params={}",
                    best.objective,
                    best.params.as_ref().map(ToString::to_string).unwrap_or_default()
                );
                Ok(best)
            }
            Err(e) => {
                error!(
                    run = %self.status.id,
                    trials_completed = self.status.trials_completed,
                    "optimization run aborted: {e}"
                );
                self.status.mark_failed(e.to_string());
                Err(e)
            }
        }
    }

    fn drive<E: Experiment + ?Sized>(
        &mut self,
        experiment: &mut E,
        mut stabilizer: Option<&mut dyn FnMut(&PhysicalPoint) -> Result<(), EvaluationError>>,
    ) -> LbResult<()> {
        experiment.prepare()?;

        for t in 0..self.config.max_trials {
            let (candidate, source) = self.next_candidate(t)?;

            if let Some(hook) = stabilizer.as_deref_mut() {
                hook(&candidate)?;
            }

            let objective = experiment.evaluate(&candidate)?;
            if !objective.is_finite() {
                return Err(EvaluationError::Failed {
                    message: format!("trial {t} produced a non-finite objective ({objective})"),
                }
                .into());
            }

            let unit = self.space.normalize(&candidate)?;
            self.surrogate.observe(unit, objective)?;

            let record = TrialRecord {
                index: t,
                objective,
                params: candidate,
                source,
                completed_at: chrono::Utc::now(),
            };
            if self.status.record_trial(&record) {
                debug!(trial = t, objective, "new incumbent");
            }
            info!(
                "trial {:02} | objective={:.4} | params={}",
                t, objective, record.params
            );
            self.history.push(record);
        }

        Ok(())
    }

    fn next_candidate(&mut self, t: usize) -> LbResult<(PhysicalPoint, CandidateSource)> {
        if let Some(point) = self.design.get(t) {
            return Ok((point.clone(), CandidateSource::Design));
        }
        let unit = self
            .surrogate
            .suggest(&mut self.rng, self.config.n_candidates)?;
        Ok((self.space.denormalize(&unit)?, CandidateSource::Acquisition))
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The precomputed seed design, in trial order.
    pub fn design(&self) -> &[PhysicalPoint] {
        &self.design
    }

    pub fn surrogate(&self) -> &Surrogate {
        &self.surrogate
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn best(&self) -> &Best {
        &self.status.best
    }

    /// Every completed trial, in order.
    pub fn history(&self) -> &[TrialRecord] {
        &self.history
    }
}

/// Optimize `experiment` over its own parameter space.
pub fn run<E: Experiment + ?Sized>(experiment: &mut E, config: &RunConfig) -> LbResult<Best> {
    let mut run = OptimizationRun::new(experiment.parameter_space().clone(), config.clone())?;
    run.execute(experiment, None)
}

/// Like [`run`], invoking `stabilizer` with each candidate before it is
/// measured. The run stops at the first stabilizer error.
pub fn run_with_stabilizer<E, S>(
    experiment: &mut E,
    config: &RunConfig,
    mut stabilizer: S,
) -> LbResult<Best>
where
    E: Experiment + ?Sized,
    S: FnMut(&PhysicalPoint) -> Result<(), EvaluationError>,
{
    let mut run = OptimizationRun::new(experiment.parameter_space().clone(), config.clone())?;
    run.execute(experiment, Some(&mut stabilizer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lb_types::{FnExperiment, LbError};

    struct CountingExperiment {
        space: ParameterSpace,
        prepared: usize,
        evaluated: usize,
    }

    impl CountingExperiment {
        fn new() -> Self {
            Self {
                space: ParameterSpace::from_bounds([("x", 0.0, 1.0), ("y", -1.0, 1.0)]).unwrap(),
                prepared: 0,
                evaluated: 0,
            }
        }
    }

    impl Experiment for CountingExperiment {
        fn parameter_space(&self) -> &ParameterSpace {
            &self.space
        }

        fn prepare(&mut self) -> Result<(), EvaluationError> {
            self.prepared += 1;
            Ok(())
        }

        fn evaluate(&mut self, params: &PhysicalPoint) -> Result<f64, EvaluationError> {
            self.evaluated += 1;
            Ok(params.require("x")? + params.require("y")?)
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn prepares_once_and_evaluates_every_trial() {
        let mut exp = CountingExperiment::new();
        let best = run(&mut exp, &RunConfig::new(3, 7, 42)).unwrap();
        assert_eq!(exp.prepared, 1);
        assert_eq!(exp.evaluated, 7);
        assert!(best.params.is_some());
    }

    #[test]
    fn design_trials_come_first() {
        let mut exp = CountingExperiment::new();
        let mut run = OptimizationRun::new(exp.space.clone(), RunConfig::new(4, 6, 1)).unwrap();
        run.execute(&mut exp, None).unwrap();

        let sources: Vec<CandidateSource> = run.history().iter().map(|r| r.source).collect();
        assert_eq!(&sources[..4], &[CandidateSource::Design; 4]);
        assert_eq!(&sources[4..], &[CandidateSource::Acquisition; 2]);
        for (record, point) in run.history().iter().zip(run.design()) {
            assert_eq!(&record.params, point);
        }
        assert_eq!(run.status().state, RunState::Completed);
        assert_eq!(run.status().trials_completed, 6);
    }

    #[test]
    fn more_design_points_than_trials_uses_design_only() {
        let mut exp = CountingExperiment::new();
        let mut run = OptimizationRun::new(exp.space.clone(), RunConfig::new(5, 2, 9)).unwrap();
        run.execute(&mut exp, None).unwrap();
        assert_eq!(run.history().len(), 2);
        assert!(run
            .history()
            .iter()
            .all(|r| r.source == CandidateSource::Design));
        assert_eq!(run.surrogate().fit_count(), 0);
    }

    #[test]
    fn stabilizer_sees_each_candidate_before_evaluation() {
        let mut exp = CountingExperiment::new();
        let mut seen = Vec::new();
        run_with_stabilizer(&mut exp, &RunConfig::new(2, 5, 3), |p: &PhysicalPoint| {
            seen.push(p.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen.len(), 5);
        assert!(seen.iter().all(|p| p.len() == 2));
    }

    #[test]
    fn stabilizer_error_aborts_the_run() {
        let mut exp = CountingExperiment::new();
        let mut run = OptimizationRun::new(exp.space.clone(), RunConfig::new(2, 5, 3)).unwrap();
        let mut calls = 0;
        let mut relock = |_: &PhysicalPoint| {
            calls += 1;
            if calls == 3 {
                Err(EvaluationError::Device {
                    device: "laser_lock".into(),
                    message: "lock lost".into(),
                })
            } else {
                Ok(())
            }
        };
        let err = run.execute(&mut exp, Some(&mut relock)).unwrap_err();

        assert!(matches!(
            err,
            LbError::Evaluation(EvaluationError::Device { ref device, .. }) if device == "laser_lock"
        ));
        assert_eq!(exp.evaluated, 2);
        assert_eq!(run.history().len(), 2);
        assert_eq!(run.status().state, RunState::Failed);
        assert!(run.status().error.as_deref().unwrap().contains("lock lost"));
    }

    #[test]
    fn run_cannot_be_executed_twice() {
        let mut exp = CountingExperiment::new();
        let mut run = OptimizationRun::new(exp.space.clone(), RunConfig::new(1, 2, 0)).unwrap();
        run.execute(&mut exp, None).unwrap();
        assert!(matches!(run.execute(&mut exp, None), Err(LbError::Config(_))));
        assert_eq!(exp.evaluated, 2);
    }

    #[test]
    fn invalid_config_rejected_before_any_trial() {
        let mut exp = CountingExperiment::new();
        assert!(run(&mut exp, &RunConfig::new(0, 5, 0)).is_err());
        assert!(run(&mut exp, &RunConfig::new(2, 0, 0)).is_err());
        assert_eq!(exp.prepared, 0);
        assert_eq!(exp.evaluated, 0);
    }

    #[test]
    fn non_finite_objective_aborts_the_run() {
        let space = ParameterSpace::from_bounds([("x", 0.0, 1.0)]).unwrap();
        let mut exp = FnExperiment::new("nan", space.clone(), |_: &PhysicalPoint| Ok(f64::NAN));
        let mut run = OptimizationRun::new(space, RunConfig::new(2, 4, 0)).unwrap();
        let err = run.execute(&mut exp, None).unwrap_err();
        assert!(matches!(
            err,
            LbError::Evaluation(EvaluationError::Failed { .. })
        ));
        assert_eq!(run.status().state, RunState::Failed);
        assert!(run.history().is_empty());
    }

    #[test]
    fn missing_key_from_custom_space_surfaces_as_error() {
        // The experiment's space lacks "y", so its evaluation fails fast.
        let exp_space = ParameterSpace::from_bounds([("x", 0.0, 1.0)]).unwrap();
        let run_space = ParameterSpace::from_bounds([("y", 0.0, 1.0)]).unwrap();
        let mut exp = FnExperiment::new("x-only", exp_space, |p: &PhysicalPoint| p.require("x"));
        let mut run = OptimizationRun::new(run_space, RunConfig::new(1, 3, 0)).unwrap();
        let err = run.execute(&mut exp, None).unwrap_err();
        assert!(matches!(
            err,
            LbError::Evaluation(EvaluationError::MissingParameter { ref name }) if name == "x"
        ));
        assert!(run.status().error.as_deref().unwrap().contains("x"));
    }
}

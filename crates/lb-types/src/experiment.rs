//! The contract between the optimization loop and whatever produces objective
//! values (a synthetic function or a hardware measurement).

use crate::errors::EvaluationError;
use crate::parameter::{ParameterSpace, PhysicalPoint};

/// An objective the optimizer maximizes.
///
/// `evaluate` may perform arbitrary side effects (timed hardware operations)
/// and blocks until the measurement is complete. Errors are never retried by
/// the loop.
pub trait Experiment {
    /// The physical search space, in axis order.
    fn parameter_space(&self) -> &ParameterSpace;

    /// One-time setup before the first trial (device init, gain settings).
    fn prepare(&mut self) -> Result<(), EvaluationError> {
        Ok(())
    }

    /// Produce the objective for a proposed point. Larger is better.
    fn evaluate(&mut self, params: &PhysicalPoint) -> Result<f64, EvaluationError>;

    /// Human-readable experiment name.
    fn name(&self) -> &str;
}

/// Experiments that can report the measurement behind an objective value.
pub trait RecordingExperiment: Experiment {
    type Record;

    fn evaluate_and_record(&mut self, params: &PhysicalPoint)
        -> Result<Self::Record, EvaluationError>;
}

impl<E: Experiment + ?Sized> Experiment for Box<E> {
    fn parameter_space(&self) -> &ParameterSpace {
        (**self).parameter_space()
    }

    fn prepare(&mut self) -> Result<(), EvaluationError> {
        (**self).prepare()
    }

    fn evaluate(&mut self, params: &PhysicalPoint) -> Result<f64, EvaluationError> {
        (**self).evaluate(params)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// An experiment backed by a plain closure. Useful for scripted objectives.
pub struct FnExperiment<F> {
    name: String,
    space: ParameterSpace,
    objective: F,
}

impl<F> FnExperiment<F>
where
    F: FnMut(&PhysicalPoint) -> Result<f64, EvaluationError>,
{
    pub fn new(name: impl Into<String>, space: ParameterSpace, objective: F) -> Self {
        Self {
            name: name.into(),
            space,
            objective,
        }
    }
}

impl<F> Experiment for FnExperiment<F>
where
    F: FnMut(&PhysicalPoint) -> Result<f64, EvaluationError>,
{
    fn parameter_space(&self) -> &ParameterSpace {
        &self.space
    }

    fn evaluate(&mut self, params: &PhysicalPoint) -> Result<f64, EvaluationError> {
        (self.objective)(params)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fn_experiment_delegates_to_closure() {
        let space = ParameterSpace::from_bounds([("x", 0.0, 10.0)]).unwrap();
        let mut calls = 0;
        let mut exp = FnExperiment::new("quadratic", space, |p: &PhysicalPoint| {
            calls += 1;
            let x = p.require("x")?;
            Ok(-(x - 7.0).powi(2))
        });

        let value = exp.evaluate(&PhysicalPoint::new().with("x", 5.0)).unwrap();
        assert_eq!(value, -4.0);
        assert!(exp.prepare().is_ok());
        assert_eq!(exp.name(), "quadratic");
        assert!(exp.evaluate(&PhysicalPoint::new()).is_err());
        drop(exp);
        assert_eq!(calls, 2);
    }

    #[test]
    fn boxed_experiment_is_an_experiment() {
        let space = ParameterSpace::from_bounds([("x", 0.0, 1.0)]).unwrap();
        let mut boxed: Box<dyn Experiment> =
            Box::new(FnExperiment::new("const", space, |_: &PhysicalPoint| Ok(1.5)));
        assert_eq!(boxed.parameter_space().dim(), 1);
        assert_eq!(boxed.evaluate(&PhysicalPoint::new()).unwrap(), 1.5);
    }
}

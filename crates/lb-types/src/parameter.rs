//! Parameter spaces and the mapping between physical and normalized points.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{EvaluationError, LbError, LbResult};

/// A point in the unit hypercube, one coordinate per parameter in space order.
pub type NormalizedPoint = Vec<f64>;

/// A single continuous dimension of the search space.
///
/// Bounds are validated on construction (`low < high`, both finite) and the
/// parameter is immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ParameterDef", into = "ParameterDef")]
pub struct Parameter {
    name: String,
    low: f64,
    high: f64,
}

/// Wire form of a [`Parameter`], e.g. `{"name": "x", "bounds": [0.0, 10.0]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ParameterDef {
    name: String,
    bounds: (f64, f64),
}

impl Parameter {
    pub fn new(name: impl Into<String>, low: f64, high: f64) -> LbResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(crate::config_error!("parameter name must not be empty"));
        }
        if !low.is_finite() || !high.is_finite() {
            return Err(crate::config_error!(
                "parameter {name}: bounds must be finite, got ({low}, {high})"
            ));
        }
        if low >= high {
            return Err(crate::config_error!(
                "parameter {name}: low bound {low} must be below high bound {high}"
            ));
        }
        if !(high - low).is_finite() {
            return Err(crate::config_error!(
                "parameter {name}: width of ({low}, {high}) overflows"
            ));
        }
        Ok(Self { name, low, high })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.low, self.high)
    }

    /// Width of the interval, always positive.
    pub fn span(&self) -> f64 {
        self.high - self.low
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

impl TryFrom<ParameterDef> for Parameter {
    type Error = LbError;

    fn try_from(def: ParameterDef) -> Result<Self, Self::Error> {
        Parameter::new(def.name, def.bounds.0, def.bounds.1)
    }
}

impl From<Parameter> for ParameterDef {
    fn from(param: Parameter) -> Self {
        Self {
            name: param.name,
            bounds: (param.low, param.high),
        }
    }
}

/// The full search space: an ordered, non-empty list of uniquely named
/// parameters. The order fixes the axis order of every [`NormalizedPoint`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Parameter>", into = "Vec<Parameter>")]
pub struct ParameterSpace {
    parameters: Vec<Parameter>,
}

impl ParameterSpace {
    pub fn new(parameters: Vec<Parameter>) -> LbResult<Self> {
        if parameters.is_empty() {
            return Err(crate::config_error!(
                "parameter space must include at least one parameter"
            ));
        }
        for (i, param) in parameters.iter().enumerate() {
            if parameters[..i].iter().any(|p| p.name == param.name) {
                return Err(crate::config_error!(
                    "duplicate parameter name: {}",
                    param.name
                ));
            }
        }
        Ok(Self { parameters })
    }

    /// Build a space from `(name, low, high)` triples.
    pub fn from_bounds<N: Into<String>>(
        bounds: impl IntoIterator<Item = (N, f64, f64)>,
    ) -> LbResult<Self> {
        let parameters = bounds
            .into_iter()
            .map(|(name, low, high)| Parameter::new(name, low, high))
            .collect::<LbResult<Vec<_>>>()?;
        Self::new(parameters)
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Number of dimensions.
    pub fn dim(&self) -> usize {
        self.parameters.len()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Map a physical point into the unit hypercube. No clamping is applied.
    pub fn normalize(&self, physical: &PhysicalPoint) -> LbResult<NormalizedPoint> {
        self.parameters
            .iter()
            .map(|p| {
                let value = physical
                    .get(&p.name)
                    .ok_or_else(|| LbError::MissingParameter {
                        name: p.name.clone(),
                    })?;
                Ok((value - p.low) / p.span())
            })
            .collect()
    }

    /// Map a unit-hypercube point back into physical units. No clamping is
    /// applied.
    pub fn denormalize(&self, unit: &[f64]) -> LbResult<PhysicalPoint> {
        if unit.len() != self.dim() {
            return Err(LbError::DimensionMismatch {
                expected: self.dim(),
                actual: unit.len(),
            });
        }
        Ok(self
            .parameters
            .iter()
            .zip(unit)
            .map(|(p, u)| (p.name.clone(), p.low + u * p.span()))
            .collect())
    }
}

impl TryFrom<Vec<Parameter>> for ParameterSpace {
    type Error = LbError;

    fn try_from(parameters: Vec<Parameter>) -> Result<Self, Self::Error> {
        ParameterSpace::new(parameters)
    }
}

impl From<ParameterSpace> for Vec<Parameter> {
    fn from(space: ParameterSpace) -> Self {
        space.parameters
    }
}

/// A concrete assignment of physical values, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhysicalPoint(BTreeMap<String, f64>);

impl PhysicalPoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Look up a value an experiment cannot run without.
    pub fn require(&self, name: &str) -> Result<f64, EvaluationError> {
        self.get(name).ok_or_else(|| EvaluationError::MissingParameter {
            name: name.to_string(),
        })
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) -> Option<f64> {
        self.0.insert(name.into(), value)
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for PhysicalPoint {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for PhysicalPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

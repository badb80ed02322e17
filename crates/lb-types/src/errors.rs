use thiserror::Error;

/// Main error type for the LabBO system
#[derive(Error, Debug)]
pub enum LbError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing parameter in point: {name}")]
    MissingParameter { name: String },

    #[error("Dimension mismatch: expected {expected} coordinates, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Surrogate error: {0}")]
    Surrogate(#[from] SurrogateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by an experiment while producing an objective value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Required parameter missing: {name}")]
    MissingParameter { name: String },

    #[error("Device {device} failed: {message}")]
    Device { device: String, message: String },

    #[error("Experiment not prepared: {message}")]
    NotPrepared { message: String },

    #[error("Evaluation failed: {message}")]
    Failed { message: String },
}

/// Errors raised while fitting or querying the surrogate model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurrogateError {
    #[error("Covariance matrix is not positive definite ({observations} observations)")]
    NotPositiveDefinite { observations: usize },

    #[error("Cannot fit a model without observations")]
    Empty,
}

/// Result type alias for LabBO operations
pub type LbResult<T> = Result<T, LbError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::LbError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = LbError::DimensionMismatch {
            expected: 3,
            actual: 2,
        };

        assert!(error.to_string().contains("expected 3"));
        assert!(error.to_string().contains("got 2"));
    }

    #[test]
    fn test_error_conversion() {
        let eval_error = EvaluationError::Device {
            device: "adc0".to_string(),
            message: "not connected".to_string(),
        };
        let lb_error: LbError = eval_error.into();

        match lb_error {
            LbError::Evaluation(EvaluationError::Device { device, .. }) => {
                assert_eq!(device, "adc0")
            }
            _ => panic!("Expected Evaluation error"),
        }
    }

    #[test]
    fn test_config_macro() {
        let err = config_error!("max_trials must be at least {}", 1);
        assert!(matches!(err, LbError::Config(ref msg) if msg.contains("at least 1")));
    }
}

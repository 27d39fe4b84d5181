use thiserror::Error;

/// Raised by an anomaly model's `fit` or `score`. The pipeline disables
/// that model for the current tick and continues; it never aborts the run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("model `{model}` has not accumulated enough samples to fit: have {have}, need {need}")]
    InsufficientSamples {
        model: &'static str,
        have: usize,
        need: usize,
    },

    #[error("model `{model}` is not fitted yet")]
    NotFitted { model: &'static str },
}

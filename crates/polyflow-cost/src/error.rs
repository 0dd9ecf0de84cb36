use thiserror::Error;

pub type Result<T> = std::result::Result<T, CostError>;

#[derive(Debug, Error)]
pub enum CostError {
    /// Malformed estimator specification; raised when configuration is loaded,
    /// never during execution.
    #[error("invalid load specification '{spec}': {reason}")]
    Spec { spec: String, reason: String },

    #[error(transparent)]
    Config(#[from] polyflow_core::error::Error),
}

impl CostError {
    pub(crate) fn spec(spec: &str, reason: impl Into<String>) -> Self {
        CostError::Spec {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}

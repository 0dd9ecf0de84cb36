use polyflow_core::id::TaskId;
use polyflow_cost::CostError;
use serde::Serialize;
use thiserror::Error;

/// Unresolvable or unconstructable platform identity. Fatal to the job.
#[derive(Debug, Clone, Error)]
#[error("could not load platform '{identity}': {reason}")]
pub struct PlatformLoadError {
    pub identity: String,
    pub reason: String,
}

/// Failure of one task's evaluation, with enough identity to locate it.
#[derive(Debug, Clone, Error, Serialize)]
#[error("task {task} ({operator} on {platform}) failed: {message}")]
pub struct ExecutionFault {
    pub task: TaskId,
    pub operator: String,
    pub platform: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    PlatformLoad(#[from] PlatformLoadError),

    #[error(
        "no compatible channel from {producer} (offers {producer_descriptors}) \
         to {consumer} (accepts {consumer_descriptors})"
    )]
    NoCompatibleChannel {
        producer: String,
        consumer: String,
        producer_descriptors: String,
        consumer_descriptors: String,
    },

    #[error("platform '{platform}' has no implementation of operator '{operator}'")]
    UnsupportedOperator { platform: String, operator: String },

    #[error("platform '{platform}' failed to warm up: {reason}")]
    WarmUp { platform: String, reason: String },

    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    #[error(transparent)]
    Cost(#[from] CostError),

    #[error(transparent)]
    Config(#[from] polyflow_core::error::Error),
}

/// Errors raised while an operator reads or writes channel instances.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("channel instance {0} has not been written yet")]
    NotReady(String),

    #[error("channel instance {0} was already consumed")]
    Consumed(String),

    #[error("channel instance {0} was already written")]
    AlreadyWritten(String),

    #[error("file channel {0} has no backing path")]
    NoFilePath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("operator error: {0}")]
    Operator(String),
}

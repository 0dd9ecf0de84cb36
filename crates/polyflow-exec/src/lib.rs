#![forbid(unsafe_code)]
//! polyflow-exec: runs an `ExecutionPlan`.
//!
//! - `executor`: the push executor, evaluating one platform execution's tasks
//!   in topological order over local channel instances.
//! - `exchange`: hand-off of crossing channel instances between executions,
//!   with failure and cancellation propagation.
//! - `runtime`: the job runner driving executions concurrently and producing
//!   a `JobReport` with a `RunManifest`.

pub mod exchange;
pub mod executor;
pub mod failpoints;
pub mod metrics;
pub mod replay;
pub mod runtime;
pub mod scheduler;

#[cfg(test)]
mod test_support;

pub use exchange::Exchange;
pub use executor::{PushExecutor, PushExecutorFactory};
pub use runtime::{ExecError, ExecutionReport, ExecutionStatus, JobReport, JobRunner};

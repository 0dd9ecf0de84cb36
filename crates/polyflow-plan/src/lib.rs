#![forbid(unsafe_code)]
//! polyflow-plan: the execution data model shared by planner and executors.
//!
//! Design intent:
//! - A `Platform` is a process-scoped immutable handle, resolved by name via
//!   `PlatformRegistry` and passed explicitly to whoever needs it.
//! - Operators are tagged variants (`OperatorKind`) bound to exactly one
//!   platform; channel capabilities and the cost estimator are data on the
//!   `ExecutionOperator`, not behavior overridden per subclass.
//! - `ExecutionPlan` is an arena of tasks, channels, and platform executions
//!   addressed by typed ids.
//! - `ChannelInstance` is the runtime handle that operators read and write.

pub mod error;
pub mod eval;
pub mod execution_plan;
pub mod instance;
pub mod job;
pub mod operator;
pub mod platform;
pub mod registry;
pub mod summary;

pub use error::{EvalError, ExecutionFault, PlanError, PlatformLoadError};
pub use execution_plan::{Channel, Consumer, ExecutionPlan, ExecutionTask, PlatformExecution};
pub use instance::{ChannelInstance, ScalarStream};
pub use job::{CancellationToken, Job};
pub use operator::{ExecutionOperator, OperatorKind, SinkHandle};
pub use platform::{
    ChannelExchange, ChannelSupport, ExchangeError, ExecutionFailure, ExecutionOutcome, Executor,
    ExecutorFactory, Platform,
};
pub use registry::PlatformRegistry;
pub use summary::PlanSummary;

//! Platforms and the executor contract.
//!
//! A platform is an immutable, process-scoped handle. It declares which
//! operator kinds it implements and over which channel descriptors, which
//! conversions it can perform, how its load profiles turn into time, and
//! how to build an executor for a job.

use std::fmt;

use polyflow_core::channel::ChannelDescriptor;
use polyflow_core::config::Configuration;
use polyflow_core::id::{ChannelId, ExecutionId};
use polyflow_cost::{CostError, LoadProfileToTimeConverter};
use serde::Serialize;
use thiserror::Error;

use crate::error::{ExecutionFault, PlanError};
use crate::execution_plan::{Channel, ExecutionPlan, ExecutionTask};
use crate::instance::ChannelInstance;
use crate::job::Job;
use crate::operator::OperatorKind;

/// Per-slot descriptor preference lists for one operator kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSupport {
    pub inputs: Vec<Vec<ChannelDescriptor>>,
    pub outputs: Vec<Vec<ChannelDescriptor>>,
}

impl ChannelSupport {
    /// Every slot of `kind` gets the same lists.
    pub fn uniform(
        kind: &OperatorKind,
        inputs: &[ChannelDescriptor],
        outputs: &[ChannelDescriptor],
    ) -> Self {
        let (n_in, n_out) = kind.arity();
        Self {
            inputs: vec![inputs.to_vec(); n_in],
            outputs: vec![outputs.to_vec(); n_out],
        }
    }
}

pub trait Platform: Send + Sync + fmt::Debug {
    /// Unique identity; also the platform segment of configuration keys.
    fn name(&self) -> &str;

    /// Overlay this platform's defaults; existing keys win.
    fn configure_defaults(&self, _cfg: &mut Configuration) {}

    fn executor_factory(&self) -> &dyn ExecutorFactory;

    /// A fresh executor for `job`; no state is carried between jobs.
    fn create_executor(&self, job: &Job) -> Box<dyn Executor> {
        self.executor_factory().create(job)
    }

    /// Channel capabilities of `kind` here, or `None` if unimplemented.
    fn channel_support(&self, kind: &OperatorKind) -> Option<ChannelSupport>;

    /// Descriptor pairs `(from, to)` this platform can convert between.
    fn conversions(&self) -> Vec<(ChannelDescriptor, ChannelDescriptor)> {
        Vec::new()
    }

    /// Whether `producer` and `consumer`, linked by `channel`, may run in one
    /// platform execution. Panics if the tasks are not bound to this platform
    /// or `channel` does not link them.
    fn is_single_platform_execution_possible(
        &self,
        producer: &ExecutionTask,
        channel: &Channel,
        consumer: &ExecutionTask,
    ) -> bool {
        check_fusion_preconditions(self.name(), producer, channel, consumer);
        true
    }

    fn create_load_profile_to_time_converter(
        &self,
        cfg: &Configuration,
    ) -> Result<LoadProfileToTimeConverter, CostError> {
        LoadProfileToTimeConverter::from_configuration(self.name(), cfg)
    }

    /// Best-effort start-up work. Failures are logged by the caller.
    fn warm_up(&self, _cfg: &Configuration) -> Result<(), PlanError> {
        Ok(())
    }

    /// Estimated start-up time charged once per plan that touches this platform.
    fn initialize_millis(&self, _cfg: &Configuration) -> u64 {
        0
    }
}

impl fmt::Display for dyn Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Platform[{}]", self.name())
    }
}

/// Shared precondition check for fusion predicates.
pub fn check_fusion_preconditions(
    platform: &str,
    producer: &ExecutionTask,
    channel: &Channel,
    consumer: &ExecutionTask,
) {
    assert_eq!(
        producer.operator.platform_name(),
        platform,
        "producer {} is not bound to {platform}",
        producer.id
    );
    assert_eq!(
        consumer.operator.platform_name(),
        platform,
        "consumer {} is not bound to {platform}",
        consumer.id
    );
    assert_eq!(
        channel.producer, producer.id,
        "{} is not produced by {}",
        channel.id, producer.id
    );
    assert!(
        channel.consumers.iter().any(|c| c.task == consumer.id),
        "{} is not consumed by {}",
        channel.id,
        consumer.id
    );
}

pub trait ExecutorFactory: Send + Sync {
    fn create(&self, job: &Job) -> Box<dyn Executor>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    pub execution: ExecutionId,
    pub tasks_run: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Error)]
pub enum ExecutionFailure {
    #[error(transparent)]
    Fault(#[from] ExecutionFault),

    #[error("execution cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("job cancelled")]
    Cancelled,

    #[error("producer of {0} failed")]
    UpstreamFailed(ChannelId),

    #[error("{0} is not a crossing channel of this plan")]
    Unknown(ChannelId),
}

/// Hand-off point for crossing channels between platform executions.
pub trait ChannelExchange: Sync {
    /// Block until the instance of `channel` is published, then take a handle
    /// to it. Ownership of the handle moves to the caller.
    fn acquire(&self, channel: ChannelId) -> Result<ChannelInstance, ExchangeError>;

    /// Publish a fully written instance.
    fn publish(&self, instance: ChannelInstance) -> Result<(), ExchangeError>;

    fn is_cancelled(&self) -> bool;
}

/// Runs platform executions of one job on one platform.
pub trait Executor: Send {
    fn platform_name(&self) -> &str;

    fn execute(
        &mut self,
        plan: &ExecutionPlan,
        execution: ExecutionId,
        exchange: &dyn ChannelExchange,
    ) -> Result<ExecutionOutcome, ExecutionFailure>;

    /// Release executor resources once the job is done.
    fn dispose(&mut self) {}
}

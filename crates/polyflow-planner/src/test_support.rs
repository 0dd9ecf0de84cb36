//! Configurable platform for planner tests.

use std::fmt;
use std::sync::Arc;

use polyflow_core::channel::{ChannelDescriptor, Transport, COLLECTION, STREAM};
use polyflow_core::config::Configuration;
use polyflow_core::id::ExecutionId;
use polyflow_plan::{
    Channel, ChannelExchange, ChannelSupport, ExecutionFailure, ExecutionOperator,
    ExecutionOutcome, ExecutionPlan, ExecutionTask, Executor, ExecutorFactory, Job, OperatorKind,
    Platform, SinkHandle,
};

pub const A: ChannelDescriptor = ChannelDescriptor::new("a", Transport::Collection, true, true);
pub const B: ChannelDescriptor = ChannelDescriptor::new("b", Transport::Collection, true, true);
pub const C: ChannelDescriptor = ChannelDescriptor::new("c", Transport::Collection, true, true);

pub struct FakePlatform {
    pub name: String,
    pub conversions: Vec<(ChannelDescriptor, ChannelDescriptor)>,
    pub fuse: bool,
    pub init_ms: u64,
    factory: NoopFactory,
}

impl FakePlatform {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            conversions: Vec::new(),
            fuse: true,
            init_ms: 0,
            factory: NoopFactory,
        }
    }

    pub fn with_conversion(mut self, from: ChannelDescriptor, to: ChannelDescriptor) -> Self {
        self.conversions.push((from, to));
        self
    }

    pub fn without_fusion(mut self) -> Self {
        self.fuse = false;
        self
    }

    pub fn with_init_ms(mut self, ms: u64) -> Self {
        self.init_ms = ms;
        self
    }

    pub fn shared(self) -> Arc<dyn Platform> {
        Arc::new(self)
    }
}

impl fmt::Debug for FakePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FakePlatform({})", self.name)
    }
}

struct NoopFactory;

impl ExecutorFactory for NoopFactory {
    fn create(&self, _job: &Job) -> Box<dyn Executor> {
        Box::new(NoopExecutor)
    }
}

struct NoopExecutor;

impl Executor for NoopExecutor {
    fn platform_name(&self) -> &str {
        "noop"
    }

    fn execute(
        &mut self,
        _plan: &ExecutionPlan,
        execution: ExecutionId,
        _exchange: &dyn ChannelExchange,
    ) -> Result<ExecutionOutcome, ExecutionFailure> {
        Ok(ExecutionOutcome {
            execution,
            tasks_run: 0,
            elapsed_ms: 0,
        })
    }
}

impl Platform for FakePlatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn executor_factory(&self) -> &dyn ExecutorFactory {
        &self.factory
    }

    fn channel_support(&self, kind: &OperatorKind) -> Option<ChannelSupport> {
        Some(ChannelSupport::uniform(kind, &[STREAM, COLLECTION], &[STREAM, COLLECTION]))
    }

    fn conversions(&self) -> Vec<(ChannelDescriptor, ChannelDescriptor)> {
        self.conversions.clone()
    }

    fn is_single_platform_execution_possible(
        &self,
        producer: &ExecutionTask,
        channel: &Channel,
        consumer: &ExecutionTask,
    ) -> bool {
        polyflow_plan::platform::check_fusion_preconditions(&self.name, producer, channel, consumer);
        self.fuse
    }

    fn initialize_millis(&self, _cfg: &Configuration) -> u64 {
        self.init_ms
    }
}

pub fn source(p: &Arc<dyn Platform>, outputs: &[ChannelDescriptor]) -> ExecutionOperator {
    ExecutionOperator::new(
        OperatorKind::collection_source(Vec::new()),
        Arc::clone(p),
        vec![],
        vec![outputs.to_vec()],
    )
}

pub fn map(
    p: &Arc<dyn Platform>,
    inputs: &[ChannelDescriptor],
    outputs: &[ChannelDescriptor],
) -> ExecutionOperator {
    ExecutionOperator::new(
        OperatorKind::map(|x| x),
        Arc::clone(p),
        vec![inputs.to_vec()],
        vec![outputs.to_vec()],
    )
}

pub fn sink(p: &Arc<dyn Platform>, inputs: &[ChannelDescriptor]) -> ExecutionOperator {
    ExecutionOperator::new(
        OperatorKind::collect_sink(SinkHandle::new()),
        Arc::clone(p),
        vec![inputs.to_vec()],
        vec![],
    )
}

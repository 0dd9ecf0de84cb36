//! Push executor: evaluates one platform execution task by task.
//!
//! Channels internal to the execution live in a local map and are reused in
//! place. Crossing inputs come from the exchange. Crossing outputs are
//! materialized as they are written but only published once every task of
//! the execution has succeeded, so consumers never see data from a failed
//! execution. An output slot bound to several channels is teed: the operator
//! writes one collection that is copied into each channel.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace};

use polyflow_core::channel::{Transport, COLLECTION};
use polyflow_core::config::FILE_CHANNEL_DIR;
use polyflow_core::id::{ChannelId, ExecutionId, JobId};
use polyflow_plan::{
    ChannelExchange, ChannelInstance, EvalError, ExchangeError, ExecutionFailure, ExecutionFault,
    ExecutionOutcome, ExecutionPlan, ExecutionTask, Executor, ExecutorFactory, Job,
};

use crate::failpoints::FailPoints;
use crate::metrics::emit_span;

/// Builds a `PushExecutor` per job for the named platform.
#[derive(Debug, Clone)]
pub struct PushExecutorFactory {
    platform: Arc<str>,
}

impl PushExecutorFactory {
    pub fn new(platform: &str) -> Self {
        Self {
            platform: Arc::from(platform),
        }
    }
}

impl ExecutorFactory for PushExecutorFactory {
    fn create(&self, job: &Job) -> Box<dyn Executor> {
        Box::new(PushExecutor::new(Arc::clone(&self.platform), job))
    }
}

pub struct PushExecutor {
    platform: Arc<str>,
    job: JobId,
    file_dir: PathBuf,
    failpoints: FailPoints,
    executions_run: usize,
}

impl PushExecutor {
    pub fn new(platform: Arc<str>, job: &Job) -> Self {
        let cfg = job.configuration();
        let file_dir = cfg
            .get_string_property(FILE_CHANNEL_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("polyflow"));
        Self {
            platform,
            job: job.id(),
            file_dir,
            failpoints: FailPoints::from_configuration(cfg),
            executions_run: 0,
        }
    }

    fn instance_for(&self, plan: &ExecutionPlan, channel: ChannelId) -> ChannelInstance {
        let descriptor = plan.channel(channel).descriptor;
        let instance = ChannelInstance::new(channel, descriptor);
        if descriptor.transport == Transport::File {
            let name = format!(
                "p{}-job{}-ch{}.jsonl",
                std::process::id(),
                self.job.get(),
                channel.get()
            );
            instance.with_file_path(self.file_dir.join(name))
        } else {
            instance
        }
    }
}

fn fault(task: &ExecutionTask, message: impl Into<String>) -> ExecutionFault {
    ExecutionFault {
        task: task.id,
        operator: task.operator.kind().name().to_string(),
        platform: task.operator.platform_name().to_string(),
        message: message.into(),
    }
}

fn exchange_failure(task: &ExecutionTask, err: ExchangeError) -> ExecutionFailure {
    match err {
        ExchangeError::Cancelled | ExchangeError::UpstreamFailed(_) => ExecutionFailure::Cancelled,
        ExchangeError::Unknown(_) => ExecutionFailure::Fault(fault(task, err.to_string())),
    }
}

/// Local channel instances plus how many local reads each has left.
struct LocalChannels {
    instances: HashMap<ChannelId, ChannelInstance>,
    reads_left: HashMap<ChannelId, usize>,
}

impl LocalChannels {
    fn new(plan: &ExecutionPlan, execution: ExecutionId) -> Self {
        let mut reads_left = HashMap::new();
        for t in &plan.execution(execution).tasks {
            for ch in plan.task(*t).input_channels() {
                *reads_left.entry(ch).or_insert(0) += 1;
            }
        }
        Self {
            instances: HashMap::new(),
            reads_left,
        }
    }

    fn has_local_readers(&self, channel: ChannelId) -> bool {
        self.reads_left.get(&channel).copied().unwrap_or(0) > 0
    }

    fn insert(&mut self, instance: ChannelInstance) {
        self.instances.insert(instance.channel(), instance);
    }

    /// The last local read takes the instance; earlier reads share it.
    fn take(&mut self, channel: ChannelId) -> Result<ChannelInstance, EvalError> {
        let left = self.reads_left.entry(channel).or_insert(1);
        *left = left.saturating_sub(1);
        if *left == 0 {
            self.instances
                .remove(&channel)
                .ok_or_else(|| EvalError::NotReady(channel.to_string()))
        } else {
            self.instances
                .get(&channel)
                .ok_or_else(|| EvalError::NotReady(channel.to_string()))?
                .share()
        }
    }
}

impl Executor for PushExecutor {
    fn platform_name(&self) -> &str {
        &self.platform
    }

    fn execute(
        &mut self,
        plan: &ExecutionPlan,
        execution: ExecutionId,
        exchange: &dyn ChannelExchange,
    ) -> Result<ExecutionOutcome, ExecutionFailure> {
        let started = Instant::now();
        let exec = plan.execution(execution);
        assert_eq!(
            exec.platform.name(),
            &*self.platform,
            "{execution} belongs to another platform"
        );
        debug!(%execution, platform = %self.platform, tasks = exec.tasks.len(), "execution started");

        let mut local = LocalChannels::new(plan, execution);
        let mut crossing: Vec<ChannelInstance> = Vec::new();
        let mut tasks_run = 0;
        for task_id in &exec.tasks {
            let task = plan.task(*task_id);
            if exchange.is_cancelled() {
                return Err(ExecutionFailure::Cancelled);
            }
            self.failpoints.check(task)?;

            let mut inputs = Vec::with_capacity(task.inputs.len());
            for ch in task.input_channels() {
                let remote = plan.execution_of(plan.channel(ch).producer) != execution;
                if remote && !local.instances.contains_key(&ch) {
                    let acquired = exchange.acquire(ch).map_err(|e| exchange_failure(task, e))?;
                    trace!(channel = %ch, "acquired crossing input");
                    local.insert(acquired);
                }
                inputs.push(local.take(ch).map_err(|e| fault(task, e.to_string()))?);
            }

            let mut outputs: Vec<ChannelInstance> = task
                .outputs
                .iter()
                .map(|slot| match slot.as_slice() {
                    [single] => self.instance_for(plan, *single),
                    // Teed slot: the operator writes one shared collection.
                    many => ChannelInstance::new(many[0], COLLECTION),
                })
                .collect();

            task.operator
                .evaluate(&mut inputs, &mut outputs)
                .map_err(|e| fault(task, e.to_string()))?;
            drop(inputs);

            for (slot, mut written) in task.outputs.iter().zip(outputs) {
                let mut produced = Vec::with_capacity(slot.len());
                if slot.len() == 1 {
                    produced.push(written);
                } else {
                    let data = written
                        .provide_collection()
                        .map_err(|e| fault(task, e.to_string()))?;
                    for ch in slot {
                        let mut copy = self.instance_for(plan, *ch);
                        copy.accept_shared(Arc::clone(&data))
                            .map_err(|e| fault(task, e.to_string()))?;
                        produced.push(copy);
                    }
                }
                for mut instance in produced {
                    let ch = instance.channel();
                    if plan.is_internal(ch) {
                        local.insert(instance);
                        continue;
                    }
                    instance
                        .materialize()
                        .map_err(|e| fault(task, e.to_string()))?;
                    if local.has_local_readers(ch) {
                        let shared = instance.share().map_err(|e| fault(task, e.to_string()))?;
                        local.insert(shared);
                    }
                    crossing.push(instance);
                }
            }
            tasks_run += 1;
        }

        if exchange.is_cancelled() {
            return Err(ExecutionFailure::Cancelled);
        }
        for instance in crossing {
            let ch = instance.channel();
            let producer = plan.task(plan.channel(ch).producer);
            exchange
                .publish(instance)
                .map_err(|e| exchange_failure(producer, e))?;
            trace!(channel = %ch, "published crossing output");
        }

        self.executions_run += 1;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        emit_span(
            "execution",
            &[
                ("execution", execution.to_string()),
                ("platform", self.platform.to_string()),
                ("tasks", tasks_run.to_string()),
                ("elapsed_ms", elapsed_ms.to_string()),
            ],
        );
        Ok(ExecutionOutcome {
            execution,
            tasks_run,
            elapsed_ms,
        })
    }

    fn dispose(&mut self) {
        debug!(platform = %self.platform, job = %self.job, executions = self.executions_run, "executor disposed");
    }
}

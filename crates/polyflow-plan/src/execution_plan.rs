//! The assembled plan: an arena of tasks, channels, and platform executions.
//!
//! Ids are arena indices. Assembly adds tasks and channels, groups tasks into
//! executions, then `seal()` orders every execution topologically, derives
//! the crossing channels, and checks the structural invariants.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use polyflow_core::channel::{describe, ChannelDescriptor};
use polyflow_core::id::{ChannelId, ExecutionId, NodeId, TaskId};
use polyflow_cost::CardinalityEstimate;

use crate::error::PlanError;
use crate::operator::{ExecutionOperator, OperatorKind};
use crate::platform::Platform;

#[derive(Debug)]
pub struct ExecutionTask {
    pub id: TaskId,
    pub operator: Arc<ExecutionOperator>,
    /// One channel per input slot once bound.
    pub inputs: Vec<Option<ChannelId>>,
    /// Usually one channel per output slot; several only when a
    /// single-consumer descriptor fans out.
    pub outputs: Vec<Vec<ChannelId>>,
    pub execution: Option<ExecutionId>,
    /// Graph node this task was created for; `None` for conversions.
    pub origin: Option<NodeId>,
    /// Estimated cardinality per output slot.
    pub cardinalities: Vec<CardinalityEstimate>,
}

impl ExecutionTask {
    pub fn is_conversion(&self) -> bool {
        matches!(self.operator.kind(), OperatorKind::Convert)
    }

    pub fn input_channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.inputs.iter().flatten().copied()
    }

    pub fn output_channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.outputs.iter().flatten().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consumer {
    pub task: TaskId,
    pub input_index: usize,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub id: ChannelId,
    pub descriptor: ChannelDescriptor,
    pub producer: TaskId,
    pub output_index: usize,
    pub consumers: Vec<Consumer>,
    pub cardinality: CardinalityEstimate,
}

#[derive(Debug)]
pub struct PlatformExecution {
    pub id: ExecutionId,
    pub platform: Arc<dyn Platform>,
    /// Member tasks in evaluation order.
    pub tasks: Vec<TaskId>,
    /// Channels produced elsewhere and consumed here.
    pub inbound: Vec<ChannelId>,
    /// Channels produced here and consumed by at least one other execution.
    pub outbound: Vec<ChannelId>,
}

#[derive(Debug, Default)]
pub struct ExecutionPlan {
    tasks: Vec<ExecutionTask>,
    channels: Vec<Channel>,
    executions: Vec<PlatformExecution>,
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, operator: Arc<ExecutionOperator>, origin: Option<NodeId>) -> TaskId {
        let id = TaskId::new(self.tasks.len() as u64);
        self.tasks.push(ExecutionTask {
            id,
            inputs: vec![None; operator.input_arity()],
            outputs: vec![Vec::new(); operator.output_arity()],
            cardinalities: vec![CardinalityEstimate::default(); operator.output_arity()],
            operator,
            execution: None,
            origin,
        });
        id
    }

    /// New channel written by output `output_index` of `producer`.
    pub fn add_channel(
        &mut self,
        descriptor: ChannelDescriptor,
        producer: TaskId,
        output_index: usize,
    ) -> ChannelId {
        let id = ChannelId::new(self.channels.len() as u64);
        let task = &mut self.tasks[producer.index()];
        assert!(output_index < task.outputs.len(), "{producer} has no output {output_index}");
        task.outputs[output_index].push(id);
        let cardinality = task.cardinalities[output_index];
        self.channels.push(Channel {
            id,
            descriptor,
            producer,
            output_index,
            consumers: Vec::new(),
            cardinality,
        });
        id
    }

    /// Bind `channel` to input `input_index` of `task`.
    pub fn add_consumer(&mut self, channel: ChannelId, task: TaskId, input_index: usize) {
        let slot = &mut self.tasks[task.index()].inputs[input_index];
        assert!(slot.is_none(), "input {input_index} of {task} is already bound");
        *slot = Some(channel);
        self.channels[channel.index()].consumers.push(Consumer { task, input_index });
    }

    pub fn set_cardinality(&mut self, task: TaskId, output_index: usize, card: CardinalityEstimate) {
        let t = &mut self.tasks[task.index()];
        t.cardinalities[output_index] = card;
        for ch in &t.outputs[output_index] {
            self.channels[ch.index()].cardinality = card;
        }
    }

    /// Group `tasks` into a new execution on `platform`.
    pub fn add_execution(&mut self, platform: Arc<dyn Platform>, tasks: Vec<TaskId>) -> ExecutionId {
        let id = ExecutionId::new(self.executions.len() as u64);
        for t in &tasks {
            let task = &mut self.tasks[t.index()];
            assert!(task.execution.is_none(), "{t} is already grouped");
            task.execution = Some(id);
        }
        self.executions.push(PlatformExecution {
            id,
            platform,
            tasks,
            inbound: Vec::new(),
            outbound: Vec::new(),
        });
        id
    }

    pub fn task(&self, id: TaskId) -> &ExecutionTask {
        &self.tasks[id.index()]
    }

    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id.index()]
    }

    pub fn execution(&self, id: ExecutionId) -> &PlatformExecution {
        &self.executions[id.index()]
    }

    pub fn tasks(&self) -> &[ExecutionTask] {
        &self.tasks
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn executions(&self) -> &[PlatformExecution] {
        &self.executions
    }

    pub fn conversion_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_conversion()).count()
    }

    /// Execution of the task, panicking if grouping has not happened.
    pub fn execution_of(&self, task: TaskId) -> ExecutionId {
        self.tasks[task.index()]
            .execution
            .unwrap_or_else(|| panic!("{task} is not grouped"))
    }

    /// True if producer and every consumer of `channel` share one execution.
    pub fn is_internal(&self, channel: ChannelId) -> bool {
        let ch = self.channel(channel);
        let home = self.task(ch.producer).execution;
        home.is_some() && ch.consumers.iter().all(|c| self.task(c.task).execution == home)
    }

    /// Tasks in producer-before-consumer order; ties resolve by task id.
    pub fn topological_order(&self) -> Result<Vec<TaskId>, PlanError> {
        let mut indegree: Vec<usize> = self
            .tasks
            .iter()
            .map(|t| t.input_channels().count())
            .collect();
        let mut ready: BTreeSet<TaskId> = self
            .tasks
            .iter()
            .filter(|t| indegree[t.id.index()] == 0)
            .map(|t| t.id)
            .collect();
        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for ch in self.task(next).output_channels() {
                for c in &self.channel(ch).consumers {
                    indegree[c.task.index()] -= 1;
                    if indegree[c.task.index()] == 0 {
                        ready.insert(c.task);
                    }
                }
            }
        }
        if order.len() != self.tasks.len() {
            return Err(PlanError::InvalidGraph("task graph has a cycle".into()));
        }
        Ok(order)
    }

    /// Executions in an order where every producer of a crossing channel
    /// comes before its consumers.
    pub fn execution_order(&self) -> Result<Vec<ExecutionId>, PlanError> {
        let n = self.executions.len();
        let mut indegree = vec![0usize; n];
        let mut edges: Vec<BTreeSet<ExecutionId>> = vec![BTreeSet::new(); n];
        for e in &self.executions {
            for ch in &e.outbound {
                for c in &self.channel(*ch).consumers {
                    let to = self.execution_of(c.task);
                    if to != e.id && edges[e.id.index()].insert(to) {
                        indegree[to.index()] += 1;
                    }
                }
            }
        }
        let mut ready: VecDeque<ExecutionId> =
            (0..n).filter(|i| indegree[*i] == 0).map(|i| ExecutionId::new(i as u64)).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(next) = ready.pop_front() {
            order.push(next);
            for to in &edges[next.index()] {
                indegree[to.index()] -= 1;
                if indegree[to.index()] == 0 {
                    ready.push_back(*to);
                }
            }
        }
        if order.len() != n {
            return Err(PlanError::InvalidGraph("platform executions form a cycle".into()));
        }
        Ok(order)
    }

    /// Order member tasks, derive crossing channels, and validate.
    pub fn seal(&mut self) -> Result<(), PlanError> {
        let order = self.topological_order()?;
        let mut rank = vec![0usize; self.tasks.len()];
        for (i, t) in order.iter().enumerate() {
            rank[t.index()] = i;
        }
        for e in &mut self.executions {
            e.tasks.sort_by_key(|t| rank[t.index()]);
            e.inbound.clear();
            e.outbound.clear();
        }
        for ch in &self.channels {
            let from = self.tasks[ch.producer.index()].execution;
            let Some(from) = from else { continue };
            let mut crossing = false;
            for c in &ch.consumers {
                if let Some(to) = self.tasks[c.task.index()].execution {
                    if to != from {
                        crossing = true;
                        let inbound = &mut self.executions[to.index()].inbound;
                        if !inbound.contains(&ch.id) {
                            inbound.push(ch.id);
                        }
                    }
                }
            }
            if crossing {
                self.executions[from.index()].outbound.push(ch.id);
            }
        }
        self.validate()
    }

    /// Structural invariants of a finished plan.
    pub fn validate(&self) -> Result<(), PlanError> {
        for t in &self.tasks {
            if let Some(i) = t.inputs.iter().position(Option::is_none) {
                return Err(PlanError::InvalidGraph(format!(
                    "input {i} of {} ({}) is unbound",
                    t.id, t.operator
                )));
            }
            if let Some(i) = t.outputs.iter().position(Vec::is_empty) {
                return Err(PlanError::InvalidGraph(format!(
                    "output {i} of {} ({}) is unbound",
                    t.id, t.operator
                )));
            }
            if t.execution.is_none() {
                return Err(PlanError::InvalidGraph(format!("{} is not grouped", t.id)));
            }
        }
        for ch in &self.channels {
            if ch.consumers.is_empty() {
                return Err(PlanError::InvalidGraph(format!("{} has no consumer", ch.id)));
            }
            if !ch.descriptor.reusable && ch.consumers.len() > 1 {
                return Err(PlanError::InvalidGraph(format!(
                    "{} ({}) cannot serve {} consumers",
                    ch.id,
                    ch.descriptor,
                    ch.consumers.len()
                )));
            }
            let producer = &self.task(ch.producer).operator;
            let offered = producer.supported_output_channels(ch.output_index);
            if !offered.contains(&ch.descriptor) {
                return Err(incompatible(ch, offered, &format!("producer {producer}")));
            }
            for c in &ch.consumers {
                let consumer = &self.task(c.task).operator;
                let accepted = consumer.supported_input_channels(c.input_index);
                if !accepted.contains(&ch.descriptor) {
                    return Err(incompatible(ch, accepted, &format!("consumer {consumer}")));
                }
            }
        }
        for e in &self.executions {
            for t in &e.tasks {
                let name = self.task(*t).operator.platform_name();
                if name != e.platform.name() {
                    return Err(PlanError::InvalidGraph(format!(
                        "{t} runs on {name} but is grouped into {} on {}",
                        e.id,
                        e.platform.name()
                    )));
                }
            }
        }
        Ok(())
    }
}

fn incompatible(ch: &Channel, declared: &[ChannelDescriptor], who: &str) -> PlanError {
    PlanError::InvalidGraph(format!(
        "{} uses {} but {who} declares {}",
        ch.id,
        ch.descriptor,
        describe(declared)
    ))
}

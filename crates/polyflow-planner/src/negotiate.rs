//! Channel negotiation and plan assembly.
//!
//! For every producer output:
//! - one consumer: the first producer-preferred descriptor the consumer
//!   accepts, else a conversion chain;
//! - several consumers: one shared channel if a reusable descriptor suits
//!   all of them; otherwise a reusable hub channel with conversions branching
//!   off it; if the producer offers nothing reusable, one independently
//!   negotiated channel per consumer.

use std::sync::Arc;

use tracing::{debug, info};

use polyflow_core::channel::{describe, ChannelDescriptor};
use polyflow_core::config::Configuration;
use polyflow_core::id::{ChannelId, TaskId};
use polyflow_cost::CardinalityEstimate;
use polyflow_plan::{ExecutionPlan, Platform, PlanError, PlatformRegistry};

use crate::conversion::{ConversionGraph, ConversionPath};
use crate::cost::CostModel;
use crate::fusion;
use crate::graph::PhysicalGraph;
use crate::Result;

#[derive(Debug, Clone, Copy)]
struct Slot {
    task: TaskId,
    input: usize,
}

#[derive(Debug)]
pub struct PlanAssembler {
    conversions: ConversionGraph,
    cost: CostModel,
}

impl PlanAssembler {
    pub fn new(platforms: &[Arc<dyn Platform>], cfg: &Configuration) -> Result<Self> {
        Ok(Self {
            conversions: ConversionGraph::new(platforms, cfg)?,
            cost: CostModel::new(platforms, cfg)?,
        })
    }

    /// Assembler over every platform loaded in `registry`.
    pub fn from_registry(registry: &PlatformRegistry, cfg: &Configuration) -> Result<Self> {
        Self::new(&registry.loaded(), cfg)
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost
    }

    pub fn conversion_graph(&self) -> &ConversionGraph {
        &self.conversions
    }

    pub fn assemble(&self, graph: &PhysicalGraph) -> Result<ExecutionPlan> {
        let order = graph.validate()?;
        let mut plan = ExecutionPlan::new();

        let tasks: Vec<TaskId> = graph
            .nodes()
            .iter()
            .map(|n| plan.add_task(Arc::clone(&n.operator), Some(n.id)))
            .collect();

        for node_id in &order {
            let node = graph.node(*node_id);
            let op = &node.operator;
            let inputs: Vec<CardinalityEstimate> = (0..op.input_arity())
                .map(|input| {
                    graph
                        .edges()
                        .iter()
                        .find(|e| e.consumer == node.id && e.input == input)
                        .map(|e| plan.task(tasks[e.producer.index()]).cardinalities[e.output])
                        .unwrap_or_default()
                })
                .collect();
            let outputs = match node.cardinality {
                Some(c) => vec![c; op.output_arity()],
                None => op.output_cardinalities(&inputs),
            };
            for (i, c) in outputs.into_iter().enumerate().take(op.output_arity()) {
                plan.set_cardinality(tasks[node_id.index()], i, c);
            }
        }

        for node_id in &order {
            let producer = tasks[node_id.index()];
            for output in 0..graph.node(*node_id).operator.output_arity() {
                let consumers: Vec<Slot> = graph
                    .consumers_of(*node_id, output)
                    .iter()
                    .map(|e| Slot {
                        task: tasks[e.consumer.index()],
                        input: e.input,
                    })
                    .collect();
                self.bind_output(&mut plan, producer, output, &consumers)?;
            }
        }

        fusion::group(&mut plan)?;
        plan.seal()?;
        info!(
            tasks = plan.tasks().len(),
            channels = plan.channels().len(),
            conversions = plan.conversion_count(),
            executions = plan.executions().len(),
            "plan assembled"
        );
        Ok(plan)
    }

    fn bind_output(
        &self,
        plan: &mut ExecutionPlan,
        producer: TaskId,
        output: usize,
        consumers: &[Slot],
    ) -> Result<()> {
        let offered = plan
            .task(producer)
            .operator
            .supported_output_channels(output)
            .to_vec();
        let card = plan.task(producer).cardinalities[output];

        if let [only] = consumers {
            return self.connect(plan, producer, output, &offered, *only, card);
        }

        let accepts = |plan: &ExecutionPlan, slot: &Slot, d: &ChannelDescriptor| {
            plan.task(slot.task)
                .operator
                .supported_input_channels(slot.input)
                .contains(d)
        };
        let reusable: Vec<ChannelDescriptor> =
            offered.iter().filter(|d| d.reusable).copied().collect();

        if let Some(shared) = reusable
            .iter()
            .find(|d| consumers.iter().all(|s| accepts(plan, s, d)))
        {
            let ch = plan.add_channel(*shared, producer, output);
            for s in consumers {
                plan.add_consumer(ch, s.task, s.input);
            }
            debug!(%producer, descriptor = %shared, consumers = consumers.len(), "shared fan-out channel");
            return Ok(());
        }

        if !reusable.is_empty() {
            // Hub: accepted by the most consumers, earliest producer preference on ties.
            let mut hub = reusable[0];
            let mut hub_count = 0;
            for d in &reusable {
                let n = consumers.iter().filter(|s| accepts(plan, s, d)).count();
                if n > hub_count {
                    hub = *d;
                    hub_count = n;
                }
            }
            let ch = plan.add_channel(hub, producer, output);
            for s in consumers {
                if accepts(plan, s, &hub) {
                    plan.add_consumer(ch, s.task, s.input);
                } else {
                    let path = self.find_path(plan, producer, &[hub], *s, card)?;
                    self.apply_path(plan, ch, &path, *s, card);
                }
            }
            debug!(%producer, descriptor = %hub, consumers = consumers.len(), "hub fan-out channel");
            return Ok(());
        }

        for s in consumers {
            self.connect(plan, producer, output, &offered, *s, card)?;
        }
        debug!(%producer, consumers = consumers.len(), "per-consumer fan-out channels");
        Ok(())
    }

    fn connect(
        &self,
        plan: &mut ExecutionPlan,
        producer: TaskId,
        output: usize,
        offered: &[ChannelDescriptor],
        slot: Slot,
        card: CardinalityEstimate,
    ) -> Result<()> {
        let accepted = plan
            .task(slot.task)
            .operator
            .supported_input_channels(slot.input);
        if let Some(d) = offered.iter().find(|d| accepted.contains(d)).copied() {
            let ch = plan.add_channel(d, producer, output);
            plan.add_consumer(ch, slot.task, slot.input);
            return Ok(());
        }
        let path = self.find_path(plan, producer, offered, slot, card)?;
        let ch = plan.add_channel(path.source, producer, output);
        self.apply_path(plan, ch, &path, slot, card);
        Ok(())
    }

    fn find_path(
        &self,
        plan: &ExecutionPlan,
        producer: TaskId,
        offered: &[ChannelDescriptor],
        slot: Slot,
        card: CardinalityEstimate,
    ) -> Result<ConversionPath> {
        let consumer = &plan.task(slot.task).operator;
        let accepted = consumer.supported_input_channels(slot.input);
        self.conversions
            .find(offered, accepted, card, &self.cost)
            .ok_or_else(|| PlanError::NoCompatibleChannel {
                producer: plan.task(producer).operator.to_string(),
                consumer: consumer.to_string(),
                producer_descriptors: describe(offered),
                consumer_descriptors: describe(accepted),
            })
    }

    /// Chain fresh conversion tasks from `channel` to `slot`.
    fn apply_path(
        &self,
        plan: &mut ExecutionPlan,
        channel: ChannelId,
        path: &ConversionPath,
        slot: Slot,
        card: CardinalityEstimate,
    ) {
        let mut upstream = channel;
        for step in &path.steps {
            let conv = self.conversions.conversion(*step);
            let task = plan.add_task(Arc::new(conv.operator.copy()), None);
            plan.set_cardinality(task, 0, card);
            plan.add_consumer(upstream, task, 0);
            upstream = plan.add_channel(conv.to, task, 0);
            debug!(%task, from = %conv.from, to = %conv.to, platform = conv.operator.platform_name(), "inserted conversion");
        }
        plan.add_consumer(upstream, slot.task, slot.input);
    }
}

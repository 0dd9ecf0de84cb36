//! Serializable view of an `ExecutionPlan`, hashed for provenance and
//! rendered by explain output.

use serde::Serialize;

use polyflow_core::error::Result;
use polyflow_core::hash::{hash_serde, Hash256};

use crate::execution_plan::ExecutionPlan;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSummary {
    pub executions: Vec<ExecutionSummary>,
    pub tasks: Vec<TaskSummary>,
    pub channels: Vec<ChannelSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub id: u64,
    pub platform: String,
    pub tasks: Vec<u64>,
    pub inbound: Vec<u64>,
    pub outbound: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub id: u64,
    pub operator: String,
    pub platform: String,
    pub conversion: bool,
    pub inputs: Vec<Option<u64>>,
    pub outputs: Vec<Vec<u64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSummary {
    pub id: u64,
    pub descriptor: String,
    pub producer: u64,
    pub consumers: Vec<u64>,
    pub crossing: bool,
    pub cardinality: (u64, u64),
}

impl PlanSummary {
    pub fn of(plan: &ExecutionPlan) -> Self {
        let executions = plan
            .executions()
            .iter()
            .map(|e| ExecutionSummary {
                id: e.id.get(),
                platform: e.platform.name().to_string(),
                tasks: e.tasks.iter().map(|t| t.get()).collect(),
                inbound: e.inbound.iter().map(|c| c.get()).collect(),
                outbound: e.outbound.iter().map(|c| c.get()).collect(),
            })
            .collect();
        let tasks = plan
            .tasks()
            .iter()
            .map(|t| TaskSummary {
                id: t.id.get(),
                operator: t.operator.kind().name().to_string(),
                platform: t.operator.platform_name().to_string(),
                conversion: t.is_conversion(),
                inputs: t.inputs.iter().map(|c| c.map(|c| c.get())).collect(),
                outputs: t
                    .outputs
                    .iter()
                    .map(|slot| slot.iter().map(|c| c.get()).collect())
                    .collect(),
            })
            .collect();
        let channels = plan
            .channels()
            .iter()
            .map(|c| ChannelSummary {
                id: c.id.get(),
                descriptor: c.descriptor.name.to_string(),
                producer: c.producer.get(),
                consumers: c.consumers.iter().map(|x| x.task.get()).collect(),
                crossing: !plan.is_internal(c.id),
                cardinality: (c.cardinality.lower, c.cardinality.upper),
            })
            .collect();
        Self {
            executions,
            tasks,
            channels,
        }
    }

    /// Stable content hash; equal plans hash equal regardless of operator ids.
    pub fn hash(&self) -> Result<Hash256> {
        hash_serde(self)
    }

    /// Multi-line, human-readable rendering.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for e in &self.executions {
            out.push_str(&format!("execution {} on {}\n", e.id, e.platform));
            for t in &e.tasks {
                let Some(task) = self.tasks.iter().find(|x| x.id == *t) else {
                    continue;
                };
                let marker = if task.conversion { " (conversion)" } else { "" };
                out.push_str(&format!("  task {} {}{marker}\n", task.id, task.operator));
                for slot in &task.outputs {
                    for c in slot {
                        if let Some(ch) = self.channels.iter().find(|x| x.id == *c) {
                            let kind = if ch.crossing { "crossing" } else { "internal" };
                            out.push_str(&format!(
                                "    -> channel {} [{}] {kind} to {:?}\n",
                                ch.id, ch.descriptor, ch.consumers
                            ));
                        }
                    }
                }
            }
        }
        out
    }
}

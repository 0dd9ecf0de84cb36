//! Plan costing: load profiles → time, per task, per plan.
//!
//! A plan costs the sum of its task time estimates plus the start-up time of
//! every distinct platform it touches. Tasks without an estimator cost zero.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use polyflow_core::config::Configuration;
use polyflow_core::id::TaskId;
use polyflow_cost::{CardinalityEstimate, LoadProfileToTimeConverter, TimeEstimate};
use polyflow_plan::{ExecutionOperator, ExecutionPlan, Platform};

use crate::Result;

#[derive(Debug, Clone)]
pub struct CostModel {
    converters: BTreeMap<String, LoadProfileToTimeConverter>,
    initialize_ms: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanCost {
    pub tasks: Vec<(u64, TimeEstimate)>,
    pub startup_ms: u64,
    pub total: TimeEstimate,
}

impl CostModel {
    pub fn new(platforms: &[Arc<dyn Platform>], cfg: &Configuration) -> Result<Self> {
        let mut converters = BTreeMap::new();
        let mut initialize_ms = BTreeMap::new();
        for p in platforms {
            converters.insert(
                p.name().to_string(),
                p.create_load_profile_to_time_converter(cfg)?,
            );
            initialize_ms.insert(p.name().to_string(), p.initialize_millis(cfg));
        }
        Ok(Self {
            converters,
            initialize_ms,
        })
    }

    /// Time for one invocation of `operator`.
    pub fn operator_time(
        &self,
        operator: &ExecutionOperator,
        inputs: &[CardinalityEstimate],
        outputs: &[CardinalityEstimate],
    ) -> TimeEstimate {
        let Some(profile) = operator.estimate_load(inputs, outputs) else {
            return TimeEstimate::zero();
        };
        match self.converters.get(operator.platform_name()) {
            Some(conv) => conv.convert(&profile),
            None => LoadProfileToTimeConverter::new(operator.platform_name()).convert(&profile),
        }
    }

    pub fn initialize_ms(&self, platform: &str) -> u64 {
        self.initialize_ms.get(platform).copied().unwrap_or(0)
    }

    pub fn estimate(&self, plan: &ExecutionPlan) -> PlanCost {
        let mut tasks = Vec::with_capacity(plan.tasks().len());
        let mut total = TimeEstimate::zero();
        for t in plan.tasks() {
            let inputs: Vec<CardinalityEstimate> = t
                .input_channels()
                .map(|c| plan.channel(c).cardinality)
                .collect();
            let time = self.operator_time(&t.operator, &inputs, &t.cardinalities);
            total = total.plus(&time);
            tasks.push((t.id.get(), time));
        }
        let platforms: BTreeSet<&str> = plan
            .executions()
            .iter()
            .map(|e| e.platform.name())
            .collect();
        let startup_ms: u64 = platforms.iter().map(|p| self.initialize_ms(p)).sum();
        PlanCost {
            tasks,
            startup_ms,
            total: total.plus(&TimeEstimate::from_ms(startup_ms as f64)),
        }
    }
}

impl PlanCost {
    pub fn task(&self, id: TaskId) -> Option<TimeEstimate> {
        self.tasks
            .iter()
            .find(|(t, _)| *t == id.get())
            .map(|(_, time)| *time)
    }
}

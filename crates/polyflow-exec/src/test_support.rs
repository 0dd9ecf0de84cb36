//! Push-executed platform for runtime tests.

use std::sync::Arc;

use polyflow_core::channel::{ChannelDescriptor, COLLECTION, FILE, STREAM};
use polyflow_core::config::Configuration;
use polyflow_core::types::Scalar;
use polyflow_plan::{
    ChannelSupport, ExecutionOperator, ExecutionPlan, ExecutorFactory, OperatorKind, Platform,
};
use polyflow_planner::{PhysicalGraph, PlanAssembler};

use crate::executor::PushExecutorFactory;

/// Accepts `descriptors` everywhere and converts them to any built-in one.
#[derive(Debug)]
pub struct Engine {
    name: &'static str,
    descriptors: Vec<ChannelDescriptor>,
    factory: PushExecutorFactory,
}

impl Engine {
    pub fn shared(name: &'static str, descriptors: &[ChannelDescriptor]) -> Arc<dyn Platform> {
        Arc::new(Self {
            name,
            descriptors: descriptors.to_vec(),
            factory: PushExecutorFactory::new(name),
        })
    }
}

impl Platform for Engine {
    fn name(&self) -> &str {
        self.name
    }

    fn executor_factory(&self) -> &dyn ExecutorFactory {
        &self.factory
    }

    fn channel_support(&self, kind: &OperatorKind) -> Option<ChannelSupport> {
        Some(ChannelSupport::uniform(kind, &self.descriptors, &self.descriptors))
    }

    fn conversions(&self) -> Vec<(ChannelDescriptor, ChannelDescriptor)> {
        let mut out = Vec::new();
        for a in &self.descriptors {
            for b in [STREAM, COLLECTION, FILE] {
                if *a != b {
                    out.push((*a, b));
                }
            }
        }
        out
    }
}

pub fn bind(p: &Arc<dyn Platform>, kind: OperatorKind) -> ExecutionOperator {
    ExecutionOperator::bind(p, kind, &Configuration::new()).unwrap()
}

pub fn ints(v: &[i64]) -> Vec<Scalar> {
    v.iter().copied().map(Scalar::I64).collect()
}

pub fn plan(g: &PhysicalGraph, platforms: &[Arc<dyn Platform>]) -> ExecutionPlan {
    PlanAssembler::new(platforms, &Configuration::new())
        .unwrap()
        .assemble(g)
        .unwrap()
}

//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use polyflow_core::config::Configuration;
use polyflow_core::types::Scalar;
use polyflow_plan::{ExecutionOperator, Job, OperatorKind, Platform, PlatformRegistry};
use polyflow_platforms::register_builtin;

/// A registry with both built-in platforms loaded, plus a configuration
/// carrying their defaults on top of `overrides`.
pub fn builtin(overrides: Configuration) -> (PlatformRegistry, Configuration) {
    let mut registry = PlatformRegistry::new();
    register_builtin(&mut registry);
    registry.load_all().expect("built-in platforms load");
    let mut cfg = overrides.fork();
    registry.apply_defaults(&mut cfg);
    (registry, cfg)
}

pub fn platform(registry: &PlatformRegistry, name: &str) -> Arc<dyn Platform> {
    registry.load(name).expect("platform is registered")
}

pub fn bind(platform: &Arc<dyn Platform>, kind: OperatorKind, cfg: &Configuration) -> ExecutionOperator {
    ExecutionOperator::bind(platform, kind, cfg).expect("operator binds")
}

pub fn ints(values: &[i64]) -> Vec<Scalar> {
    values.iter().copied().map(Scalar::I64).collect()
}

pub fn job(name: &str, cfg: &Configuration) -> Job {
    Job::new(name, Arc::new(cfg.clone()))
}

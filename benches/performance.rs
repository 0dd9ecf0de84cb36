use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use polyflow_core::config::Configuration;
use polyflow_core::types::Scalar;
use polyflow_plan::{ExecutionOperator, OperatorKind, Platform, PlatformRegistry, SinkHandle};
use polyflow_planner::{PhysicalGraph, PlanAssembler};
use polyflow_platforms::register_builtin;

/// A chain of `stages` maps alternating between the two built-in platforms.
fn make_graph(local: &Arc<dyn Platform>, batch: &Arc<dyn Platform>, cfg: &Configuration, stages: usize) -> PhysicalGraph {
    let mut g = PhysicalGraph::new();
    let data: Vec<Scalar> = (0..1024).map(Scalar::I64).collect();
    let mut prev = g.add_operator(
        ExecutionOperator::bind(local, OperatorKind::collection_source(data), cfg).unwrap(),
    );
    for i in 0..stages {
        let p = if i % 2 == 0 { batch } else { local };
        let next = g.add_operator(ExecutionOperator::bind(p, OperatorKind::map(|q| q), cfg).unwrap());
        g.connect(prev, 0, next, 0);
        prev = next;
    }
    let sink = g.add_operator(
        ExecutionOperator::bind(local, OperatorKind::collect_sink(SinkHandle::new()), cfg).unwrap(),
    );
    g.connect(prev, 0, sink, 0);
    g
}

fn bench_plan_assembly(c: &mut Criterion) {
    let mut registry = PlatformRegistry::new();
    register_builtin(&mut registry);
    let platforms = registry.load_all().unwrap();
    let mut cfg = Configuration::new();
    registry.apply_defaults(&mut cfg);
    let local = registry.load("local").unwrap();
    let batch = registry.load("batch").unwrap();

    let assembler = PlanAssembler::new(&platforms, &cfg).unwrap();
    let graph = make_graph(&local, &batch, &cfg, 32);
    c.bench_function("assemble_32_stages", |b| {
        b.iter(|| {
            let _ = assembler.assemble(&graph).unwrap();
        })
    });
}

criterion_group!(planning, bench_plan_assembly);
criterion_main!(planning);

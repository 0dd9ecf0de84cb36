//! Plan assembly over the built-in platforms.

mod fixtures;

use std::sync::Arc;

use fixtures::{bind, builtin, ints, job, platform};
use polyflow_core::channel::{COLLECTION, STREAM};
use polyflow_core::config::Configuration;
use polyflow_cost::{CardinalityEstimate, Resource};
use polyflow_exec::JobRunner;
use polyflow_plan::{OperatorKind, PlanError, PlatformRegistry, SinkHandle};
use polyflow_planner::{explain, Optimizer, PhysicalGraph, PlanAssembler};
use polyflow_platforms::DATASET;

#[test]
fn two_operator_stream_pipeline_runs_in_one_execution() {
    let (registry, cfg) = builtin(Configuration::new());
    let local = platform(&registry, "local");
    let sink = SinkHandle::new();

    let mut g = PhysicalGraph::new();
    let src = g.add_operator(bind(&local, OperatorKind::collection_source(ints(&[1, 2, 3])), &cfg));
    let dst = g.add_operator(bind(&local, OperatorKind::collect_sink(sink.clone()), &cfg));
    g.connect(src, 0, dst, 0);

    let plan = PlanAssembler::from_registry(&registry, &cfg)
        .unwrap()
        .assemble(&g)
        .unwrap();
    assert_eq!(plan.executions().len(), 1);
    assert_eq!(plan.channels().len(), 1);
    assert_eq!(plan.channels()[0].descriptor, STREAM);
    assert_eq!(plan.conversion_count(), 0);
    assert_eq!(plan.tasks()[1].inputs.len(), 1);

    let report = JobRunner::new(&cfg).unwrap().run(&job("two-op", &cfg), &plan).unwrap();
    assert!(report.is_success());
    assert_eq!(sink.snapshot(), ints(&[1, 2, 3]));
}

#[test]
fn local_to_batch_edge_gets_one_conversion() {
    let (registry, cfg) = builtin(Configuration::new());
    let local = platform(&registry, "local");
    let batch = platform(&registry, "batch");

    let mut g = PhysicalGraph::new();
    let src = g.add_operator(bind(&local, OperatorKind::collection_source(ints(&[1, 2, 3])), &cfg));
    let map = g.add_operator(bind(&batch, OperatorKind::map(|q| q), &cfg));
    let dst = g.add_operator(bind(&batch, OperatorKind::collect_sink(SinkHandle::new()), &cfg));
    g.connect(src, 0, map, 0);
    g.connect(map, 0, dst, 0);

    let plan = PlanAssembler::from_registry(&registry, &cfg)
        .unwrap()
        .assemble(&g)
        .unwrap();
    assert_eq!(plan.conversion_count(), 1);
    let convert = plan.tasks().iter().find(|t| t.is_conversion()).unwrap();
    assert_eq!(convert.operator.platform_name(), "batch");

    let descriptors: Vec<_> = plan.channels().iter().map(|c| c.descriptor).collect();
    assert!(descriptors.contains(&COLLECTION));
    assert_eq!(descriptors.iter().filter(|d| **d == DATASET).count(), 2);
    // source alone, then conversion + map + sink as one batch stage
    assert_eq!(plan.executions().len(), 2);
    plan.validate().unwrap();
}

#[test]
fn missing_conversion_is_reported_with_both_ends() {
    let (registry, cfg) = builtin(Configuration::new());
    let local = platform(&registry, "local");
    let batch = platform(&registry, "batch");

    let mut g = PhysicalGraph::new();
    let src = g.add_operator(bind(&local, OperatorKind::collection_source(ints(&[1])), &cfg));
    let dst = g.add_operator(bind(&batch, OperatorKind::collect_sink(SinkHandle::new()), &cfg));
    g.connect(src, 0, dst, 0);
    let edges_before = g.edges().len();

    // Only local conversions are known: nothing produces a dataset.
    let assembler = PlanAssembler::new(&[local], &cfg).unwrap();
    match assembler.assemble(&g).unwrap_err() {
        PlanError::NoCompatibleChannel {
            producer,
            consumer,
            producer_descriptors,
            consumer_descriptors,
        } => {
            assert_eq!(producer, "collection-source@local");
            assert_eq!(consumer, "collect-sink@batch");
            assert_eq!(producer_descriptors, "[stream, collection]");
            assert_eq!(consumer_descriptors, "[dataset]");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(g.edges().len(), edges_before);
}

#[test]
fn optimizer_avoids_batch_start_up_for_small_inputs() {
    let (registry, cfg) = builtin(Configuration::new());
    let local = platform(&registry, "local");
    let batch = platform(&registry, "batch");

    let candidate = |p: &Arc<dyn polyflow_plan::Platform>| {
        let mut g = PhysicalGraph::new();
        let src = g.add_operator(bind(p, OperatorKind::collection_source(ints(&[3, 1, 2])), &cfg));
        let sort = g.add_operator(bind(p, OperatorKind::Sort, &cfg));
        let dst = g.add_operator(bind(p, OperatorKind::collect_sink(SinkHandle::new()), &cfg));
        g.connect(src, 0, sort, 0);
        g.connect(sort, 0, dst, 0);
        g
    };

    let optimizer = Optimizer::new(&registry, &cfg).unwrap();
    let ranked = optimizer.choose(&[candidate(&batch), candidate(&local)]).unwrap();
    assert_eq!(ranked.index, 1);
    assert_eq!(ranked.cost.startup_ms, 0);

    let text = explain(&ranked.plan, &ranked.cost);
    assert!(text.contains("on local"), "{text}");
    assert!(!text.contains("on batch"), "{text}");
}

#[test]
fn registry_reports_unknown_and_broken_platforms() {
    let mut registry = PlatformRegistry::new();
    polyflow_platforms::register_builtin(&mut registry);
    registry.register("gpu", || Err("driver not found".to_string()));

    let err = registry.load("spark").unwrap_err();
    assert_eq!(err.identity, "spark");
    let err = registry.load("gpu").unwrap_err();
    assert!(err.to_string().contains("driver not found"));
    assert!(registry.load_all().is_err());
    assert!(registry.load("local").is_ok());
}

#[test]
fn malformed_load_specification_fails_before_planning() {
    let mut overrides = Configuration::new();
    overrides.set_property("polyflow.local.map.load", "cpu = 2 ++ in0");
    let (registry, cfg) = builtin(overrides);
    assert!(matches!(
        registry.validate_cost_configuration(&cfg),
        Err(PlanError::Cost(_))
    ));
    let local = platform(&registry, "local");
    assert!(polyflow_plan::ExecutionOperator::bind(&local, OperatorKind::map(|q| q), &cfg).is_err());
}

#[test]
fn operator_copies_share_behavior_but_not_identity() {
    let (registry, cfg) = builtin(Configuration::new());
    let local = platform(&registry, "local");
    let original = bind(&local, OperatorKind::Distinct, &cfg);
    let a = original.copy();
    let b = original.copy();

    assert_ne!(a.id(), b.id());
    assert_ne!(a.id(), original.id());
    assert_eq!(a.supported_input_channels(0), b.supported_input_channels(0));
    assert_eq!(a.supported_output_channels(0), original.supported_output_channels(0));

    let ins = [CardinalityEstimate::exact(100)];
    let outs = [CardinalityEstimate::new(1, 100, 0.8)];
    assert_eq!(a.estimate_load(&ins, &outs), b.estimate_load(&ins, &outs));
    assert_eq!(a.estimate_load(&ins, &outs), original.estimate_load(&ins, &outs));
}

#[test]
fn default_estimators_are_monotonic() {
    let (registry, cfg) = builtin(Configuration::new());
    for name in ["local", "batch"] {
        let p = platform(&registry, name);
        for kind in [
            OperatorKind::map(|q| q),
            OperatorKind::filter(|_| true),
            OperatorKind::flat_map(|q| vec![q]),
            OperatorKind::UnionAll,
            OperatorKind::Distinct,
            OperatorKind::Count,
            OperatorKind::Sort,
        ] {
            let op = bind(&p, kind, &cfg);
            assert!(op.load_estimator().unwrap().is_monotonic(), "{op}");
            for n in [0u64, 1, 10, 1_000, 1_000_000] {
                let small = vec![CardinalityEstimate::new(n, n * 2, 1.0); op.input_arity()];
                let big = vec![CardinalityEstimate::new(n * 2, n * 4, 1.0); op.input_arity()];
                let a = op.estimate_load(&small, &op.output_cardinalities(&small)).unwrap();
                let b = op.estimate_load(&big, &op.output_cardinalities(&big)).unwrap();
                for r in Resource::ALL {
                    assert!(b.total(r).lower >= a.total(r).lower, "{op} {r} at {n}");
                }
            }
        }
    }
}

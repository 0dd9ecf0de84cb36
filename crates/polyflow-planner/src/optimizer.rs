//! Candidate ranking and explain output.

use tracing::{debug, warn};

use polyflow_core::config::Configuration;
use polyflow_plan::{ExecutionPlan, PlanError, PlanSummary, PlatformRegistry};

use crate::cost::PlanCost;
use crate::graph::PhysicalGraph;
use crate::negotiate::PlanAssembler;
use crate::Result;

#[derive(Debug)]
pub struct RankedPlan {
    /// Index of the winning candidate.
    pub index: usize,
    pub plan: ExecutionPlan,
    pub cost: PlanCost,
}

#[derive(Debug)]
pub struct Optimizer {
    assembler: PlanAssembler,
}

impl Optimizer {
    pub fn new(registry: &PlatformRegistry, cfg: &Configuration) -> Result<Self> {
        Ok(Self {
            assembler: PlanAssembler::from_registry(registry, cfg)?,
        })
    }

    pub fn from_assembler(assembler: PlanAssembler) -> Self {
        Self { assembler }
    }

    pub fn assembler(&self) -> &PlanAssembler {
        &self.assembler
    }

    pub fn assemble(&self, graph: &PhysicalGraph) -> Result<RankedPlan> {
        let plan = self.assembler.assemble(graph)?;
        let cost = self.assembler.cost_model().estimate(&plan);
        Ok(RankedPlan {
            index: 0,
            plan,
            cost,
        })
    }

    /// Assemble every candidate and keep the cheapest. Candidates that fail
    /// assembly are skipped; if all fail, the first failure is returned.
    pub fn choose(&self, candidates: &[PhysicalGraph]) -> Result<RankedPlan> {
        let mut best: Option<RankedPlan> = None;
        let mut first_error = None;
        for (index, graph) in candidates.iter().enumerate() {
            match self.assemble(graph) {
                Ok(mut ranked) => {
                    ranked.index = index;
                    debug!(candidate = index, cost = %ranked.cost.total, "candidate costed");
                    let better = best
                        .as_ref()
                        .map_or(true, |b| ranked.cost.total.compare(&b.cost.total).is_lt());
                    if better {
                        best = Some(ranked);
                    }
                }
                Err(e) => {
                    warn!(candidate = index, error = %e, "candidate rejected");
                    first_error.get_or_insert(e);
                }
            }
        }
        match (best, first_error) {
            (Some(b), _) => Ok(b),
            (None, Some(e)) => Err(e),
            (None, None) => Err(PlanError::InvalidGraph("no candidate graphs".into())),
        }
    }
}

/// Human-readable plan with per-task time estimates.
pub fn explain(plan: &ExecutionPlan, cost: &PlanCost) -> String {
    let summary = PlanSummary::of(plan);
    let mut out = format!(
        "plan: {} executions, {} tasks, {} channels, {} conversions\n",
        plan.executions().len(),
        plan.tasks().len(),
        plan.channels().len(),
        plan.conversion_count()
    );
    out.push_str(&summary.render());
    out.push_str("costs:\n");
    for (task, time) in &cost.tasks {
        out.push_str(&format!("  task {task}: {time}\n"));
    }
    out.push_str(&format!(
        "platform start-up: {} ms\ntotal: {}\n",
        cost.startup_ms, cost.total
    ));
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_support::{sink, source, FakePlatform, A, B};
    use polyflow_core::channel::{COLLECTION, STREAM};
    use polyflow_cost::CardinalityEstimate;
    use polyflow_plan::Platform;

    fn edge(p: &Arc<dyn Platform>, q: &Arc<dyn Platform>) -> PhysicalGraph {
        let mut g = PhysicalGraph::new();
        let src = g.add_operator(source(p, &[STREAM, COLLECTION]));
        let dst = g.add_operator(sink(q, &[STREAM, COLLECTION]));
        g.connect(src, 0, dst, 0);
        g.pin_cardinality(src, CardinalityEstimate::exact(1000));
        g
    }

    fn registry(platforms: Vec<Arc<dyn Platform>>) -> PlatformRegistry {
        let mut reg = PlatformRegistry::new();
        for p in platforms {
            let name = p.name().to_string();
            reg.register(name, move || Ok(Arc::clone(&p)));
        }
        reg.load_all().unwrap();
        reg
    }

    #[test]
    fn choose_prefers_fewer_platform_startups() {
        let fast = FakePlatform::new("fast").shared();
        let slow = FakePlatform::new("slow").with_init_ms(5_000).shared();
        let reg = registry(vec![fast.clone(), slow.clone()]);
        let opt = Optimizer::new(&reg, &Configuration::new()).unwrap();

        let ranked = opt
            .choose(&[edge(&fast, &slow), edge(&fast, &fast)])
            .unwrap();
        assert_eq!(ranked.index, 1);
        assert_eq!(ranked.cost.startup_ms, 0);
        assert_eq!(ranked.plan.executions().len(), 1);
    }

    #[test]
    fn task_loads_are_costed() {
        let p = FakePlatform::new("p1").shared();
        let reg = registry(vec![p.clone()]);
        let mut cfg = Configuration::new();
        cfg.set_property("polyflow.p1.cpu.ms-per-unit", "1");
        let op = polyflow_plan::ExecutionOperator::new(
            polyflow_plan::OperatorKind::collect_sink(polyflow_plan::SinkHandle::new()),
            p.clone(),
            vec![vec![STREAM]],
            vec![],
        )
        .with_load_estimator(Arc::new(polyflow_cost::parse_specification("cpu = 2*in0").unwrap()));
        let mut g = PhysicalGraph::new();
        let src = g.add_operator(source(&p, &[STREAM]));
        let dst = g.add_operator(op);
        g.connect(src, 0, dst, 0);
        g.pin_cardinality(src, CardinalityEstimate::exact(10));

        let ranked = Optimizer::new(&reg, &cfg).unwrap().assemble(&g).unwrap();
        assert_eq!(ranked.cost.total, polyflow_cost::TimeEstimate::from_ms(20.0));
        let text = explain(&ranked.plan, &ranked.cost);
        assert!(text.contains("execution 0 on p1"), "{text}");
        assert!(text.contains("collect-sink"), "{text}");
    }

    #[test]
    fn failing_candidates_are_skipped_until_none_remain() {
        let p = FakePlatform::new("p1").shared();
        let reg = registry(vec![p.clone()]);
        let opt = Optimizer::new(&reg, &Configuration::new()).unwrap();

        let mut bad = PhysicalGraph::new();
        let src = bad.add_operator(source(&p, &[A]));
        let dst = bad.add_operator(sink(&p, &[B]));
        bad.connect(src, 0, dst, 0);

        assert_eq!(opt.choose(&[bad.clone(), edge(&p, &p)]).unwrap().index, 1);
        assert!(matches!(
            opt.choose(&[bad.clone(), bad]),
            Err(PlanError::NoCompatibleChannel { .. })
        ));
        assert!(opt.choose(&[]).is_err());
    }
}

//! Job runner: drive every platform execution of a plan and report.
//!
//! Executions start in producer-before-consumer order, at most
//! `polyflow.exec.max-parallel` at a time, each on its own scoped thread with
//! its own executor. A failed execution poisons its outgoing channels, so
//! dependents end as cancelled while independent executions still finish.
//!
//! Waiting (for a slot or a crossing input) is driven on a current-thread
//! tokio runtime owned by the run, so `run` must not be called from inside
//! another tokio runtime.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use polyflow_core::config::{Configuration, MAX_PARALLEL};
use polyflow_core::id::{ExecutionId, JobId};
use polyflow_core::manifest::RunManifest;
use polyflow_plan::{
    ChannelExchange, ExecutionFailure, ExecutionFault, ExecutionOutcome, ExecutionPlan, Job,
    PlanError,
};

use crate::exchange::Exchange;
use crate::metrics::emit_span;
use crate::replay::hash_plan;
use crate::scheduler::Slots;

const DEFAULT_MAX_PARALLEL: u64 = 4;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Stage(#[from] ExecutionFault),
    #[error("job cancelled")]
    Cancelled,
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("hashing error: {0}")]
    Hash(String),
    #[error(transparent)]
    Config(#[from] polyflow_core::error::Error),
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize)]
pub enum ExecutionStatus {
    Succeeded(ExecutionOutcome),
    Failed(ExecutionFault),
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub execution: ExecutionId,
    pub platform: String,
    pub tasks: usize,
    pub status: ExecutionStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job: JobId,
    pub executions: Vec<ExecutionReport>,
    pub manifest: RunManifest,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        self.executions
            .iter()
            .all(|e| matches!(e.status, ExecutionStatus::Succeeded(_)))
    }

    pub fn faults(&self) -> Vec<&ExecutionFault> {
        self.executions
            .iter()
            .filter_map(|e| match &e.status {
                ExecutionStatus::Failed(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    pub fn status(&self, execution: ExecutionId) -> Option<&ExecutionStatus> {
        self.executions
            .iter()
            .find(|e| e.execution == execution)
            .map(|e| &e.status)
    }

    /// The first fault as an error, else `Cancelled` if anything was cancelled.
    pub fn into_result(self) -> Result<JobReport, ExecError> {
        if let Some(f) = self.faults().first() {
            return Err(ExecError::Stage((*f).clone()));
        }
        if !self.is_success() {
            return Err(ExecError::Cancelled);
        }
        Ok(self)
    }

    pub fn to_json(&self) -> Result<String, ExecError> {
        serde_json::to_string_pretty(self).map_err(|e| ExecError::Hash(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct JobRunner {
    max_parallel: usize,
}

impl JobRunner {
    pub fn new(cfg: &Configuration) -> Result<Self, ExecError> {
        let max_parallel = cfg.get_u64_or(MAX_PARALLEL, DEFAULT_MAX_PARALLEL)?.max(1) as usize;
        Ok(Self { max_parallel })
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    pub fn run(&self, job: &Job, plan: &ExecutionPlan) -> Result<JobReport, ExecError> {
        let plan_hash = hash_plan(plan)?;
        let manifest = RunManifest::new(job.id(), plan_hash, now_millis());
        let order = plan.execution_order()?;
        let runtime = tokio::runtime::Builder::new_current_thread().build()?;
        let exchange = Exchange::new(plan, job.cancellation().clone(), runtime.handle().clone());
        let slots = Slots::new(self.max_parallel);
        let statuses: Mutex<Vec<Option<ExecutionStatus>>> =
            Mutex::new(vec![None; plan.executions().len()]);

        info!(job = %job.id(), name = job.name(), executions = order.len(), hash = %plan_hash.to_hex(), "job started");

        std::thread::scope(|scope| {
            for id in &order {
                let Some(slot) = runtime.block_on(slots.acquire(job.cancellation())) else {
                    break;
                };
                let execution = plan.execution(*id);
                let mut executor = execution.platform.create_executor(job);
                let exchange = &exchange;
                let statuses = &statuses;
                scope.spawn(move || {
                    let _slot = slot;
                    let result = executor.execute(plan, execution.id, exchange);
                    executor.dispose();
                    let status = match result {
                        Ok(outcome) => ExecutionStatus::Succeeded(outcome),
                        Err(ExecutionFailure::Fault(f)) => {
                            warn!(execution = %execution.id, fault = %f, "execution failed");
                            exchange.poison(&execution.outbound);
                            ExecutionStatus::Failed(f)
                        }
                        Err(ExecutionFailure::Cancelled) => {
                            exchange.poison(&execution.outbound);
                            ExecutionStatus::Cancelled
                        }
                    };
                    statuses.lock().unwrap_or_else(|p| p.into_inner())[execution.id.index()] =
                        Some(status);
                });
            }
        });

        let statuses = statuses.into_inner().unwrap_or_else(|p| p.into_inner());
        let executions: Vec<ExecutionReport> = plan
            .executions()
            .iter()
            .zip(statuses)
            .map(|(e, status)| ExecutionReport {
                execution: e.id,
                platform: e.platform.name().to_string(),
                tasks: e.tasks.len(),
                status: status.unwrap_or(ExecutionStatus::Cancelled),
            })
            .collect();
        let platforms: BTreeSet<String> = executions
            .iter()
            .filter(|e| matches!(e.status, ExecutionStatus::Succeeded(_)))
            .map(|e| e.platform.clone())
            .collect();
        let manifest = manifest.finish(now_millis(), platforms.into_iter().collect());

        let succeeded = executions
            .iter()
            .filter(|e| matches!(e.status, ExecutionStatus::Succeeded(_)))
            .count();
        emit_span(
            "job",
            &[
                ("job", job.id().to_string()),
                ("executions", executions.len().to_string()),
                ("succeeded", succeeded.to_string()),
                ("cancelled", exchange.is_cancelled().to_string()),
            ],
        );
        info!(job = %job.id(), succeeded, total = executions.len(), "job finished");
        Ok(JobReport {
            job: job.id(),
            executions,
            manifest,
        })
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_support::{bind, ints, plan, Engine};
    use polyflow_core::channel::{COLLECTION, FILE, STREAM};
    use polyflow_core::types::Scalar;
    use polyflow_plan::{OperatorKind, SinkHandle};
    use polyflow_planner::PhysicalGraph;

    fn job(cfg: Configuration) -> Job {
        Job::new("test", Arc::new(cfg))
    }

    #[test]
    fn cross_platform_stream_is_handed_over() {
        let p1 = Engine::shared("p1", &[STREAM]);
        let p2 = Engine::shared("p2", &[STREAM, COLLECTION]);
        let sink = SinkHandle::new();
        let mut g = PhysicalGraph::new();
        let src = g.add_operator(bind(&p1, OperatorKind::collection_source(ints(&[1, 2, 3]))));
        let double = g.add_operator(bind(
            &p1,
            OperatorKind::map(|q| Scalar::I64(q.as_i64().unwrap_or(0) * 2)),
        ));
        let dst = g.add_operator(bind(&p2, OperatorKind::collect_sink(sink.clone())));
        g.connect(src, 0, double, 0);
        g.connect(double, 0, dst, 0);

        let plan = plan(&g, &[p1, p2]);
        assert_eq!(plan.executions().len(), 2);
        let report = JobRunner::new(&Configuration::new())
            .unwrap()
            .run(&job(Configuration::new()), &plan)
            .unwrap();
        assert!(report.is_success(), "{report:?}");
        assert_eq!(sink.snapshot(), ints(&[2, 4, 6]));
        assert_eq!(report.manifest.platforms, vec!["p1".to_string(), "p2".to_string()]);
        assert!(report.to_json().unwrap().contains("Succeeded"));
    }

    #[test]
    fn fault_cancels_dependents_only() {
        let p1 = Engine::shared("p1", &[COLLECTION]);
        let p2 = Engine::shared("p2", &[COLLECTION]);
        let broken = SinkHandle::new();
        let healthy = SinkHandle::new();
        let mut g = PhysicalGraph::new();
        let missing = g.add_operator(bind(&p1, OperatorKind::text_file_source("/nonexistent/polyflow/in.txt")));
        let a = g.add_operator(bind(&p2, OperatorKind::collect_sink(broken.clone())));
        g.connect(missing, 0, a, 0);
        let src = g.add_operator(bind(&p2, OperatorKind::collection_source(ints(&[9]))));
        let b = g.add_operator(bind(&p2, OperatorKind::collect_sink(healthy.clone())));
        g.connect(src, 0, b, 0);

        let plan = plan(&g, &[p1, p2]);
        let report = JobRunner::new(&Configuration::new())
            .unwrap()
            .run(&job(Configuration::new()), &plan)
            .unwrap();

        let faults = report.faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].operator, "text-file-source");
        assert_eq!(faults[0].platform, "p1");
        let dependent = plan.execution_of(plan.channels()[0].consumers[0].task);
        assert!(matches!(report.status(dependent), Some(ExecutionStatus::Cancelled)));
        assert_eq!(healthy.snapshot(), ints(&[9]));
        assert!(broken.is_empty());
        assert!(matches!(report.into_result(), Err(ExecError::Stage(_))));
    }

    #[test]
    fn later_fault_withholds_outputs_already_written() {
        // p1: src -> sort -> sink, and src also feeds a sink on p2.
        let p1 = Engine::shared("p1", &[COLLECTION]);
        let p2 = Engine::shared("p2", &[COLLECTION]);
        let local = SinkHandle::new();
        let remote = SinkHandle::new();
        let mut g = PhysicalGraph::new();
        let src = g.add_operator(bind(&p1, OperatorKind::collection_source(ints(&[1]))));
        let sort = g.add_operator(bind(&p1, OperatorKind::Sort));
        let dst = g.add_operator(bind(&p1, OperatorKind::collect_sink(local.clone())));
        let far = g.add_operator(bind(&p2, OperatorKind::collect_sink(remote.clone())));
        g.connect(src, 0, sort, 0);
        g.connect(sort, 0, dst, 0);
        g.connect(src, 0, far, 0);
        let plan = plan(&g, &[p1, p2]);
        assert_eq!(plan.executions().len(), 2);

        let mut cfg = Configuration::new();
        cfg.set_property(polyflow_core::config::FAILPOINTS, "sort");
        let report = JobRunner::new(&cfg).unwrap().run(&job(cfg), &plan).unwrap();

        let failed = plan.execution_of(plan.tasks()[0].id);
        let dependent = plan
            .executions()
            .iter()
            .find(|e| e.id != failed)
            .unwrap()
            .id;
        assert!(matches!(report.status(failed), Some(ExecutionStatus::Failed(f)) if f.operator == "sort"));
        assert!(matches!(report.status(dependent), Some(ExecutionStatus::Cancelled)));
        assert!(remote.is_empty());
        assert!(local.is_empty());
    }

    #[test]
    fn failpoint_fails_the_named_kind() {
        let p1 = Engine::shared("p1", &[STREAM]);
        let mut g = PhysicalGraph::new();
        let src = g.add_operator(bind(&p1, OperatorKind::collection_source(ints(&[1]))));
        let s = g.add_operator(bind(&p1, OperatorKind::Sort));
        let dst = g.add_operator(bind(&p1, OperatorKind::collect_sink(SinkHandle::new())));
        g.connect(src, 0, s, 0);
        g.connect(s, 0, dst, 0);
        let plan = plan(&g, &[p1]);

        let mut cfg = Configuration::new();
        cfg.set_property(polyflow_core::config::FAILPOINTS, "sort");
        let report = JobRunner::new(&cfg).unwrap().run(&job(cfg), &plan).unwrap();
        let faults = report.faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].task, polyflow_core::id::TaskId::new(1));
        assert_eq!(faults[0].message, "failpoint triggered");
    }

    #[test]
    fn cancelled_job_runs_nothing() {
        let p1 = Engine::shared("p1", &[STREAM]);
        let sink = SinkHandle::new();
        let mut g = PhysicalGraph::new();
        let src = g.add_operator(bind(&p1, OperatorKind::collection_source(ints(&[1]))));
        let dst = g.add_operator(bind(&p1, OperatorKind::collect_sink(sink.clone())));
        g.connect(src, 0, dst, 0);
        let plan = plan(&g, &[p1]);

        let job = job(Configuration::new());
        job.cancel();
        let report = JobRunner::new(&Configuration::new()).unwrap().run(&job, &plan).unwrap();
        assert!(sink.is_empty());
        assert!(matches!(report.into_result(), Err(ExecError::Cancelled)));
    }

    #[test]
    fn file_channels_are_released_after_consumption() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = Engine::shared("p1", &[FILE]);
        let p2 = Engine::shared("p2", &[FILE]);
        let sink = SinkHandle::new();
        let mut g = PhysicalGraph::new();
        let src = g.add_operator(bind(&p1, OperatorKind::collection_source(ints(&[4, 5]))));
        let dst = g.add_operator(bind(&p2, OperatorKind::collect_sink(sink.clone())));
        g.connect(src, 0, dst, 0);
        let plan = plan(&g, &[p1, p2]);
        assert_eq!(plan.channels()[0].descriptor, FILE);

        let mut cfg = Configuration::new();
        cfg.set_property(
            polyflow_core::config::FILE_CHANNEL_DIR,
            dir.path().to_string_lossy().to_string(),
        );
        let report = JobRunner::new(&cfg).unwrap().run(&job(cfg), &plan).unwrap();
        assert!(report.is_success(), "{report:?}");
        assert_eq!(sink.snapshot(), ints(&[4, 5]));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn max_parallel_one_still_completes_chains() {
        let p1 = Engine::shared("p1", &[COLLECTION]);
        let p2 = Engine::shared("p2", &[COLLECTION]);
        let sink = SinkHandle::new();
        let mut g = PhysicalGraph::new();
        let src = g.add_operator(bind(&p1, OperatorKind::collection_source(ints(&[3, 1, 2]))));
        let sort = g.add_operator(bind(&p2, OperatorKind::Sort));
        let count = g.add_operator(bind(&p1, OperatorKind::Count));
        let dst = g.add_operator(bind(&p2, OperatorKind::collect_sink(sink.clone())));
        g.connect(src, 0, sort, 0);
        g.connect(sort, 0, count, 0);
        g.connect(count, 0, dst, 0);
        let plan = plan(&g, &[p1, p2]);
        assert_eq!(plan.executions().len(), 4);

        let mut cfg = Configuration::new();
        cfg.set_property(MAX_PARALLEL, "1");
        let report = JobRunner::new(&cfg).unwrap().run(&job(cfg), &plan).unwrap();
        assert!(report.is_success());
        assert_eq!(sink.snapshot(), ints(&[3]));
    }
}

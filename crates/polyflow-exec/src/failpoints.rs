//! Chaos hooks: fail chosen operator kinds before they evaluate.
//!
//! Configured via `polyflow.exec.failpoints`, a comma-separated list of
//! operator kind names (`map,sort`). `*` fails every task.

use std::collections::BTreeSet;

use polyflow_core::config::{Configuration, FAILPOINTS};
use polyflow_plan::{ExecutionFault, ExecutionTask};

#[derive(Debug, Clone, Default)]
pub struct FailPoints {
    kinds: BTreeSet<String>,
}

impl FailPoints {
    pub fn from_configuration(cfg: &Configuration) -> Self {
        let kinds = cfg
            .get_string_property(FAILPOINTS)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self { kinds }
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn check(&self, task: &ExecutionTask) -> Result<(), ExecutionFault> {
        let kind = task.operator.kind().name();
        if self.kinds.contains(kind) || self.kinds.contains("*") {
            return Err(ExecutionFault {
                task: task.id,
                operator: kind.to_string(),
                platform: task.operator.platform_name().to_string(),
                message: "failpoint triggered".to_string(),
            });
        }
        Ok(())
    }
}

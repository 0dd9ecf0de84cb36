//! Provenance helpers.
//!
//! The plan hash covers the serialized plan summary: executions, tasks by
//! operator kind and platform, and channels by descriptor. Two assemblies of
//! the same graph hash equal even though operator ids differ.

use polyflow_core::hash::Hash256;
use polyflow_plan::{ExecutionPlan, PlanSummary};

use crate::ExecError;

pub fn hash_plan(plan: &ExecutionPlan) -> Result<Hash256, ExecError> {
    PlanSummary::of(plan)
        .hash()
        .map_err(|e| ExecError::Hash(e.to_string()))
}

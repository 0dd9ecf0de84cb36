#![forbid(unsafe_code)]
//! polyflow-planner: physical operator graph → finalized `ExecutionPlan`.
//!
//! Pipeline:
//! - `graph`: the caller's physical graph (operators already bound to platforms).
//! - `negotiate`: one channel per producer→consumer edge, picked by producer
//!   preference; conversions inserted where descriptors do not meet.
//! - `conversion`: cheapest conversion chain between two descriptor sets.
//! - `fusion`: groups same-platform tasks into platform executions.
//! - `cost` / `optimizer`: time estimates per plan and candidate ranking.
//!
//! Assembly never mutates the input graph; failures leave it untouched.

pub mod conversion;
pub mod cost;
pub mod fusion;
pub mod graph;
pub mod negotiate;
pub mod optimizer;

#[cfg(test)]
mod test_support;

pub use conversion::{Conversion, ConversionGraph, ConversionPath};
pub use cost::{CostModel, PlanCost};
pub use graph::{GraphEdge, GraphNode, PhysicalGraph};
pub use negotiate::PlanAssembler;
pub use optimizer::{explain, Optimizer, RankedPlan};
pub use polyflow_plan::PlanError;

pub type Result<T> = std::result::Result<T, PlanError>;

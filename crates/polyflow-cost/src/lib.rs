#![forbid(unsafe_code)]
//! polyflow-cost: analytical cost model used to rank candidate plans.
//!
//! Responsibilities:
//! - Cardinality ranges flowing between operators (`CardinalityEstimate`).
//! - Per-resource load ranges and nestable load profiles (`LoadProfile`).
//! - Estimators mapping cardinalities to load (`LoadEstimator`,
//!   `LoadProfileEstimator`), parseable from configuration strings.
//! - Platform-specific conversion of profiles into time (`LoadProfileToTimeConverter`).
//!
//! Nothing here affects correctness; it only decides between valid plans.

pub mod cardinality;
pub mod converter;
pub mod cost;
pub mod error;
pub mod estimator;
pub mod spec;

pub use cardinality::CardinalityEstimate;
pub use converter::{LoadProfileToTimeConverter, LoadToTimeConverter, TimeEstimate};
pub use cost::{LoadEstimate, LoadProfile, Resource};
pub use error::{CostError, Result};
pub use estimator::{
    ConstantLoadEstimator, LinearLoadEstimator, LoadEstimator, LoadProfileEstimator,
    NestableLoadProfileEstimator,
};
pub use spec::parse_specification;

#![forbid(unsafe_code)]
//! polyflow-core: shared kernel for the polyflow cross-platform engine.
//!
//! This crate contains only *pure* types and small helpers that every other
//! crate agrees on. There is **no I/O** and **no platform knowledge** here.
//!
//! Crates that use this:
//! - polyflow-cost: reads `Configuration` for estimator specs and converters.
//! - polyflow-plan: channel descriptors, ids, and `Scalar` data quanta.
//! - polyflow-planner: ids and configuration for negotiation limits.
//! - polyflow-exec: hashes the plan and emits a `RunManifest`.

pub mod channel;
pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod manifest;
pub mod prelude;
pub mod types;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#![forbid(unsafe_code)]
//! polyflow-platforms: the built-in platforms.
//!
//! - `local`: single process, lazy streams and in-memory collections.
//! - `batch`: partitioned engine; shuffles (`distinct`, `count`, `sort`)
//!   start a new stage and therefore a new platform execution.
//!
//! Both run on the push executor from `polyflow-exec`.

pub mod batch;
pub mod local;

pub use batch::{BatchPlatform, DATASET};
pub use local::LocalPlatform;

use std::sync::Arc;

use polyflow_plan::PlatformRegistry;

/// Register `local` and `batch` under their identities.
pub fn register_builtin(registry: &mut PlatformRegistry) {
    registry.register(local::NAME, || Ok(Arc::new(LocalPlatform::new())));
    registry.register(batch::NAME, || Ok(Arc::new(BatchPlatform::new())));
}

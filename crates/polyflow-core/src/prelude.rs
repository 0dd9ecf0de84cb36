//! Convenient re-exports for downstream crates.

pub use crate::channel::{ChannelDescriptor, Transport, COLLECTION, FILE, STREAM};
pub use crate::config::Configuration;
pub use crate::error::{Error, Result};
pub use crate::hash::Hash256;
pub use crate::id::{ChannelId, ExecutionId, JobId, NodeId, OperatorId, TaskId};
pub use crate::manifest::RunManifest;
pub use crate::types::Scalar;

//! Strongly-typed identifiers used across the engine.
//!
//! Downstream crates should *not* use raw integers for IDs. Plan-local ids
//! (tasks, channels, executions, graph nodes) double as arena indices.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! new_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(v: u64) -> Self {
                Self(v)
            }
            pub const fn get(self) -> u64 {
                self.0
            }
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

new_id!(NodeId);
new_id!(TaskId);
new_id!(ChannelId);
new_id!(ExecutionId);
new_id!(OperatorId);
new_id!(JobId);

static NEXT_OPERATOR: AtomicU64 = AtomicU64::new(1);
static NEXT_JOB: AtomicU64 = AtomicU64::new(1);

impl OperatorId {
    /// Process-unique operator identity; every bind or copy draws a new one.
    pub fn fresh() -> Self {
        Self(NEXT_OPERATOR.fetch_add(1, Ordering::Relaxed))
    }
}

impl JobId {
    pub fn fresh() -> Self {
        Self(NEXT_JOB.fetch_add(1, Ordering::Relaxed))
    }
}

//! Channel descriptors: capability tags for data transport between tasks.
//!
//! A descriptor is never instantiated as data; operators declare which
//! descriptors they read/write per slot, and the negotiator matches them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a channel instance physically holds its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transport {
    /// Fully materialized, in-memory collection.
    Collection,
    /// Lazy, single-pass iterator; consuming it destroys it.
    Stream,
    /// JSON-lines file on local disk.
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ChannelDescriptor {
    pub name: &'static str,
    pub transport: Transport,
    /// Multiple consumers may read the same instance.
    pub reusable: bool,
    /// May stay internal to a single platform execution (no materialization).
    pub fusible: bool,
}

impl ChannelDescriptor {
    pub const fn new(name: &'static str, transport: Transport, reusable: bool, fusible: bool) -> Self {
        Self {
            name,
            transport,
            reusable,
            fusible,
        }
    }
}

impl fmt::Display for ChannelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// In-memory collection; any number of consumers.
pub const COLLECTION: ChannelDescriptor =
    ChannelDescriptor::new("collection", Transport::Collection, true, true);

/// Lazy stream; exactly one consumer.
pub const STREAM: ChannelDescriptor = ChannelDescriptor::new("stream", Transport::Stream, false, true);

/// File on disk; shareable, always a materialization boundary.
pub const FILE: ChannelDescriptor = ChannelDescriptor::new("file", Transport::File, true, false);

/// Render a descriptor list as `[a, b]` for diagnostics.
pub fn describe(descriptors: &[ChannelDescriptor]) -> String {
    let names: Vec<&str> = descriptors.iter().map(|d| d.name).collect();
    format!("[{}]", names.join(", "))
}

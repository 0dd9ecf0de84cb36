//! Run manifest for audit: which plan ran, when, and how it ended.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::Hash256;
use crate::id::JobId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(pub Uuid);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub id: ManifestId,
    pub job: JobId,

    /// Stable hash of the executed plan summary.
    pub plan_hash: Hash256,

    /// Engine version string for provenance.
    pub engine_version: String,

    /// Platforms that ran at least one execution.
    pub platforms: Vec<String>,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl RunManifest {
    pub fn new(job: JobId, plan_hash: Hash256, started_ms: u64) -> Self {
        Self {
            id: ManifestId(Uuid::new_v4()),
            job,
            plan_hash,
            engine_version: crate::VERSION.to_string(),
            platforms: Vec::new(),
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn finish(mut self, finished_ms: u64, platforms: Vec<String>) -> Self {
        self.finished_ms = finished_ms;
        self.platforms = platforms;
        self
    }
}

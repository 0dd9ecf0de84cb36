//! Concurrency limit for platform executions.
//!
//! `Slots` wraps a tokio semaphore. The runner takes a slot before starting
//! an execution, in producer-before-consumer order, so a waiting consumer
//! never holds the last slot its producer needs.

use tokio::sync::{Semaphore, SemaphorePermit};

use polyflow_plan::CancellationToken;

pub struct Slots {
    permits: Semaphore,
}

/// Returns its slot on drop.
pub type SlotGuard<'a> = SemaphorePermit<'a>;

impl Slots {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Semaphore::new(capacity.max(1)),
        }
    }

    /// Wait for a free slot; `None` if `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<SlotGuard<'_>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = self.permits.acquire() => permit.ok(),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

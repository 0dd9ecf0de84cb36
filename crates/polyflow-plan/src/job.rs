//! Job handle: identity, configuration, and cancellation for one run.

use std::sync::Arc;

use tokio::sync::watch;

use polyflow_core::config::Configuration;
use polyflow_core::id::JobId;

/// Shared flag; cancelling is idempotent and visible to every clone.
/// Waiters parked on [`CancellationToken::cancelled`] wake when it flips.
#[derive(Debug, Clone)]
pub struct CancellationToken(Arc<watch::Sender<bool>>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(watch::channel(false).0))
    }

    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut flag = self.0.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = flag.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    name: String,
    configuration: Arc<Configuration>,
    cancellation: CancellationToken,
}

impl Job {
    pub fn new(name: impl Into<String>, configuration: Arc<Configuration>) -> Self {
        Self {
            id: JobId::fresh(),
            name: name.into(),
            configuration,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Request cancellation of every live executor of this job.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelling_a_clone_wakes_waiters() {
        let job = Job::new("t", Arc::new(Configuration::new()));
        let token = job.cancellation().clone();
        let waiter = tokio::spawn(async move { token.cancelled().await });
        assert!(!job.cancellation().is_cancelled());
        job.cancel();
        waiter.await.unwrap();
        assert!(job.cancellation().is_cancelled());
    }
}

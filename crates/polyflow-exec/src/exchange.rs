//! In-process hand-off of crossing channel instances.
//!
//! Each crossing channel has one slot. The producing execution publishes a
//! fully written instance; every consuming execution acquires it once. The
//! last acquirer takes the original handle, earlier ones get shared handles.
//! A failed producer poisons its slots so dependents stop instead of waiting.
//!
//! Waiters park on a per-slot `watch` flag that flips once the slot settles
//! (published or poisoned), raced against the job's cancellation token.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::debug;

use polyflow_core::id::ChannelId;
use polyflow_plan::{
    CancellationToken, ChannelExchange, ChannelInstance, ExchangeError, ExecutionPlan,
};

enum SlotState {
    Waiting,
    Ready(ChannelInstance),
    Taken,
    Failed,
}

struct Slot {
    state: SlotState,
    /// Consuming executions that have not acquired yet.
    remaining: usize,
    settled: watch::Sender<bool>,
}

impl Slot {
    fn settle(&mut self, state: SlotState) {
        self.state = state;
        self.settled.send_replace(true);
    }
}

pub struct Exchange {
    slots: Mutex<HashMap<ChannelId, Slot>>,
    cancellation: CancellationToken,
    runtime: Handle,
}

impl Exchange {
    /// One slot per crossing channel of `plan`, which must be sealed.
    /// Blocking acquires are driven on `runtime`.
    pub fn new(plan: &ExecutionPlan, cancellation: CancellationToken, runtime: Handle) -> Self {
        let mut slots = HashMap::new();
        for e in plan.executions() {
            for ch in &e.outbound {
                let consumers: BTreeSet<_> = plan
                    .channel(*ch)
                    .consumers
                    .iter()
                    .map(|c| plan.execution_of(c.task))
                    .filter(|x| *x != e.id)
                    .collect();
                slots.insert(
                    *ch,
                    Slot {
                        state: SlotState::Waiting,
                        remaining: consumers.len(),
                        settled: watch::channel(false).0,
                    },
                );
            }
        }
        Self {
            slots: Mutex::new(slots),
            cancellation,
            runtime,
        }
    }

    /// Mark `channels` as never arriving.
    pub fn poison(&self, channels: &[ChannelId]) {
        let mut slots = self.lock();
        for ch in channels {
            if let Some(slot) = slots.get_mut(ch) {
                if matches!(slot.state, SlotState::Waiting) {
                    slot.settle(SlotState::Failed);
                    debug!(channel = %ch, "crossing channel poisoned");
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChannelId, Slot>> {
        self.slots.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Park until `channel` settles or the job is cancelled.
    fn wait_settled(&self, channel: ChannelId) -> Result<(), ExchangeError> {
        let mut settled = self
            .lock()
            .get(&channel)
            .ok_or(ExchangeError::Unknown(channel))?
            .settled
            .subscribe();
        let cancellation = &self.cancellation;
        self.runtime.block_on(async {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => Err(ExchangeError::Cancelled),
                flag = settled.wait_for(|ready| *ready) => {
                    flag.map(|_| ()).map_err(|_| ExchangeError::Unknown(channel))
                }
            }
        })
    }
}

impl ChannelExchange for Exchange {
    fn acquire(&self, channel: ChannelId) -> Result<ChannelInstance, ExchangeError> {
        self.wait_settled(channel)?;
        let mut slots = self.lock();
        let slot = slots
            .get_mut(&channel)
            .ok_or(ExchangeError::Unknown(channel))?;
        if matches!(slot.state, SlotState::Failed) {
            return Err(ExchangeError::UpstreamFailed(channel));
        }
        if slot.remaining > 1 {
            if let SlotState::Ready(instance) = &slot.state {
                let shared = instance
                    .share()
                    .map_err(|_| ExchangeError::UpstreamFailed(channel))?;
                slot.remaining -= 1;
                return Ok(shared);
            }
        }
        match std::mem::replace(&mut slot.state, SlotState::Taken) {
            SlotState::Ready(instance) => {
                slot.remaining = 0;
                Ok(instance)
            }
            other => {
                slot.state = other;
                Err(ExchangeError::Unknown(channel))
            }
        }
    }

    fn publish(&self, instance: ChannelInstance) -> Result<(), ExchangeError> {
        let channel = instance.channel();
        let mut slots = self.lock();
        let slot = slots
            .get_mut(&channel)
            .ok_or(ExchangeError::Unknown(channel))?;
        slot.settle(SlotState::Ready(instance));
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

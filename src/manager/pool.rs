//! Pool state shared between the manager and its workers
//!
//! Every slot transition goes through [`Shared::claim_idle`],
//! [`Shared::release`] or [`Shared::retire`], each under the slots mutex, so
//! no two submissions can claim the same idle slot.

use crate::engine::BrowserLauncher;
use crate::manager::outcome::StorageWarning;
use crate::storage::StorageProvider;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Semaphore};

/// State of one worker slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Busy { rank: usize },
    /// The slot's browser could not be (re)started; it takes no more work
    Retired,
}

pub(crate) struct Shared {
    slots: Mutex<Vec<SlotState>>,
    /// One permit per idle slot
    pub(crate) permits: Arc<Semaphore>,
    live: AtomicUsize,
    pub(crate) storage: Arc<dyn StorageProvider>,
    pub(crate) launcher: Arc<dyn BrowserLauncher>,
    /// Flipped once when the manager is dropped without `close`
    cancel: watch::Sender<bool>,
    warnings: Mutex<Vec<StorageWarning>>,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Slot bookkeeping stays consistent even if a holder panicked
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    pub(crate) fn new(
        slots: Vec<SlotState>,
        storage: Arc<dyn StorageProvider>,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Self {
        let live = slots.iter().filter(|s| **s == SlotState::Idle).count();
        Self {
            slots: Mutex::new(slots),
            permits: Arc::new(Semaphore::new(live)),
            live: AtomicUsize::new(live),
            storage,
            launcher,
            cancel: watch::channel(false).0,
            warnings: Mutex::new(Vec::new()),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<SlotState> {
        lock(&self.slots).clone()
    }

    pub(crate) fn live_workers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Marks the first idle slot busy with `rank` and returns its index
    pub(crate) fn claim_idle(&self, rank: usize) -> Option<usize> {
        let mut slots = lock(&self.slots);
        let index = slots.iter().position(|s| *s == SlotState::Idle)?;
        slots[index] = SlotState::Busy { rank };
        Some(index)
    }

    /// Returns a slot to idle
    pub(crate) fn release(&self, index: usize) {
        lock(&self.slots)[index] = SlotState::Idle;
    }

    /// Takes a slot out of service
    ///
    /// When the last live slot retires the permit semaphore is closed, so
    /// pending and future submissions fail instead of waiting forever.
    pub(crate) fn retire(&self, index: usize) {
        let was_live = {
            let mut slots = lock(&self.slots);
            let was_live = slots[index] != SlotState::Retired;
            slots[index] = SlotState::Retired;
            was_live
        };

        if was_live && self.live.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.permits.close();
        }
    }

    /// Tells every worker to abandon its running sequence
    pub(crate) fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub(crate) fn cancel_signal(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    pub(crate) fn record_outcome(&self, success: bool) {
        let counter = if success { &self.succeeded } else { &self.failed };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn warn(&self, warning: StorageWarning) {
        lock(&self.warnings).push(warning);
    }

    pub(crate) fn counts(&self) -> (usize, usize) {
        (
            self.succeeded.load(Ordering::SeqCst),
            self.failed.load(Ordering::SeqCst),
        )
    }

    pub(crate) fn take_warnings(&self) -> Vec<StorageWarning> {
        std::mem::take(&mut *lock(&self.warnings))
    }
}

//! Task manager
//!
//! The [`TaskManager`] owns a fixed pool of browser workers. Sequences are
//! submitted one at a time; `submit` waits for an idle worker (FIFO, one
//! permit per idle slot) and hands the sequence to it. Every submitted
//! sequence produces exactly one [`Outcome`], delivered both to the sequence's
//! completion callback and to the returned [`SequenceHandle`].
//!
//! Shutdown happens once, through [`TaskManager::close`]: submissions are
//! refused, in-flight sequences drain, every browser is closed and finally the
//! storage provider is closed. Dropping a manager without closing it cancels
//! running sequences, which then fail, and still closes storage.

mod outcome;
mod pool;
mod worker;

pub use outcome::{Outcome, SequenceError, SequenceHandle, ShutdownReport, StorageWarning};
pub use pool::SlotState;

use crate::command::CommandSequence;
use crate::config::ManagerConfig;
use crate::engine::BrowserLauncher;
use crate::storage::StorageProvider;
use crate::{HarnessError, Result};
use pool::Shared;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use worker::{run_worker, Job};

/// Bounded pool of browser workers
pub struct TaskManager {
    shared: Arc<Shared>,
    /// Job channel per slot; None for slots that never started
    senders: Mutex<Vec<Option<mpsc::Sender<Job>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    report: tokio::sync::Mutex<Option<ShutdownReport>>,
    requested: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TaskManager {
    /// Launches one browser per worker config and starts the pool
    ///
    /// Workers whose browser fails to launch are logged and left retired.
    ///
    /// # Returns
    ///
    /// * `Ok(TaskManager)` - At least one worker is running
    /// * `Err(HarnessError::NoWorkers)` - No browser could be launched; the
    ///   storage provider has been closed
    pub async fn start<L: BrowserLauncher>(
        config: &ManagerConfig,
        launcher: L,
        storage: Arc<dyn StorageProvider>,
    ) -> Result<Self> {
        let launcher: Arc<dyn BrowserLauncher> = Arc::new(launcher);
        let requested = config.worker_count();

        let mut browsers = Vec::with_capacity(requested);
        for worker in &config.workers {
            match launcher.launch(worker).await {
                Ok(browser) => browsers.push(Some(browser)),
                Err(e) => {
                    tracing::warn!(worker = worker.worker_id, "failed to launch browser: {}", e);
                    browsers.push(None);
                }
            }
        }

        if browsers.iter().all(Option::is_none) {
            if let Err(e) = storage.close() {
                tracing::warn!("failed to close storage: {}", e);
            }
            return Err(HarnessError::NoWorkers { requested });
        }

        let slots = browsers
            .iter()
            .map(|b| {
                if b.is_some() {
                    SlotState::Idle
                } else {
                    SlotState::Retired
                }
            })
            .collect();
        let shared = Arc::new(Shared::new(slots, storage, Arc::clone(&launcher)));

        let mut senders = Vec::with_capacity(requested);
        let mut workers = Vec::with_capacity(requested);
        for (slot, (browser, worker)) in browsers.into_iter().zip(&config.workers).enumerate() {
            let Some(browser) = browser else {
                senders.push(None);
                continue;
            };

            // The slot only takes a job while idle, so one buffered job is enough
            let (tx, rx) = mpsc::channel(1);
            senders.push(Some(tx));
            workers.push(tokio::spawn(run_worker(
                slot,
                worker.clone(),
                browser,
                rx,
                Arc::clone(&shared),
            )));
        }

        tracing::info!(
            workers = shared.live_workers(),
            requested,
            "task manager started"
        );

        Ok(Self {
            shared,
            senders: Mutex::new(senders),
            workers: Mutex::new(workers),
            closed: AtomicBool::new(false),
            report: tokio::sync::Mutex::new(None),
            requested,
        })
    }

    /// Submits a sequence, waiting for an idle worker if all are busy
    ///
    /// Waiting submitters are served in arrival order.
    ///
    /// # Returns
    ///
    /// * `Ok(SequenceHandle)` - The sequence was handed to a worker
    /// * `Err(HarnessError::ManagerClosed)` - The manager is shutting down
    /// * `Err(HarnessError::NoWorkers)` - Every worker has been retired
    pub async fn submit(&self, sequence: CommandSequence) -> Result<SequenceHandle> {
        if self.is_closed() {
            return Err(HarnessError::ManagerClosed);
        }

        let permit = match Arc::clone(&self.shared.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) if self.is_closed() => return Err(HarnessError::ManagerClosed),
            Err(_) => {
                return Err(HarnessError::NoWorkers {
                    requested: self.requested,
                })
            }
        };
        if self.is_closed() {
            return Err(HarnessError::ManagerClosed);
        }

        let (site, actions, callback) = sequence.into_parts();
        let rank = site.rank();

        // Holding a permit guarantees an idle slot
        let Some(slot) = self.shared.claim_idle(rank) else {
            return Err(HarnessError::WorkerLost { rank });
        };
        let Some(sender) = lock(&self.senders).get(slot).cloned().flatten() else {
            self.shared.release(slot);
            return Err(HarnessError::ManagerClosed);
        };

        tracing::debug!(rank, worker = slot, site = %site, "dispatching sequence");

        let (reply, rx) = oneshot::channel();
        let job = Job {
            site,
            actions,
            callback,
            reply,
            permit,
        };

        if let Err(e) = sender.try_send(job) {
            tracing::error!(worker = slot, "worker is gone; retiring slot");
            self.shared.retire(slot);
            e.into_inner().permit.forget();
            return Err(HarnessError::WorkerLost { rank });
        }

        Ok(SequenceHandle::new(rank, rx))
    }

    /// Shuts the manager down
    ///
    /// Refuses new submissions, waits for in-flight sequences, closes every
    /// browser and then the storage provider. Calling it again returns the
    /// first report without touching any resource.
    pub async fn close(&self) -> Result<ShutdownReport> {
        let mut cached = self.report.lock().await;
        if let Some(report) = cached.as_ref() {
            return Ok(report.clone());
        }

        self.closed.store(true, Ordering::SeqCst);
        // Wake submitters still waiting for a worker
        self.shared.permits.close();

        // Workers finish their current job, close their browser and exit
        // once their channel is dropped
        lock(&self.senders).iter_mut().for_each(|s| *s = None);
        let workers: Vec<_> = lock(&self.workers).drain(..).collect();
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::warn!("worker task failed: {}", e);
            }
        }

        if let Err(e) = self.shared.storage.close() {
            tracing::warn!("failed to close storage: {}", e);
            self.shared.warn(StorageWarning {
                rank: None,
                message: e.to_string(),
            });
        }

        let (succeeded, failed) = self.shared.counts();
        let report = ShutdownReport {
            succeeded,
            failed,
            storage_warnings: self.shared.take_warnings(),
        };
        tracing::info!(
            succeeded,
            failed,
            warnings = report.storage_warnings.len(),
            "task manager closed"
        );

        *cached = Some(report.clone());
        Ok(report)
    }

    /// Current state of every worker slot
    pub fn slots(&self) -> Vec<SlotState> {
        self.shared.snapshot()
    }

    /// Number of workers still able to take sequences
    pub fn worker_count(&self) -> usize {
        self.shared.live_workers()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::warn!("task manager dropped without close; cancelling workers");
        self.shared.permits.close();
        self.shared.cancel();
        lock(&self.senders).clear();
        let workers: Vec<_> = lock(&self.workers).drain(..).collect();
        let shared = Arc::clone(&self.shared);

        match tokio::runtime::Handle::try_current() {
            // Cancelled workers finish their sequence as failed and close
            // their browser; storage closes once they are all gone
            Ok(runtime) => {
                runtime.spawn(async move {
                    for handle in workers {
                        if let Err(e) = handle.await {
                            tracing::warn!("worker task failed: {}", e);
                        }
                    }
                    close_storage(&shared);
                });
            }
            // Aborting a worker drops its JoinSet, which aborts the sequence
            Err(_) => {
                for handle in workers {
                    handle.abort();
                }
                close_storage(&shared);
            }
        }
    }
}

fn close_storage(shared: &Shared) {
    if let Err(e) = shared.storage.close() {
        tracing::warn!("failed to close storage: {}", e);
    }
}

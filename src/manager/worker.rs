//! Worker loop
//!
//! Each worker owns one browser and runs the jobs sent to its slot, one at a
//! time. A sequence runs in its own task, so a panic inside the engine ends
//! that task and not the worker: the worker relaunches its browser and keeps
//! serving the slot. The sequence task lives in a `JoinSet` owned by the
//! worker, so it never outlives the worker that started it.

use crate::command::{Action, CompletionCallback};
use crate::config::WorkerConfig;
use crate::engine::{Browser, EngineError, VisitData};
use crate::manager::outcome::{Outcome, SequenceError, StorageWarning};
use crate::manager::pool::Shared;
use crate::site::Site;
use crate::storage::VisitRecord;
use chrono::Utc;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Mutex, OwnedSemaphorePermit};
use tokio::task::JoinSet;

/// A browser the worker lends to its running sequence task
type SharedBrowser = Arc<Mutex<Box<dyn Browser>>>;

/// A sequence dispatched to a worker slot
pub(crate) struct Job {
    pub site: Site,
    pub actions: Vec<Action>,
    pub callback: Option<CompletionCallback>,
    pub reply: oneshot::Sender<Outcome>,
    /// Released once the slot is idle again
    pub permit: OwnedSemaphorePermit,
}

/// Runs `actions` in order, stopping at the first timeout or fault
///
/// The sleep after a fetch counts against that action's timeout.
async fn execute_sequence(
    browser: SharedBrowser,
    actions: Vec<Action>,
) -> (Vec<VisitData>, Option<SequenceError>) {
    let mut browser = browser.lock_owned().await;
    let mut visits = Vec::with_capacity(actions.len());

    for action in &actions {
        let attempt = tokio::time::timeout(action.timeout, async {
            let data = browser.fetch(&action.target).await?;
            tokio::time::sleep(action.sleep_after).await;
            Ok::<_, EngineError>(data)
        })
        .await;

        match attempt {
            Ok(Ok(data)) => visits.push(data),
            Ok(Err(e)) => return (visits, Some(SequenceError::WorkerFault(e.to_string()))),
            Err(_) => {
                let failure = SequenceError::Timeout {
                    action: action.kind,
                    target: action.target.to_string(),
                    timeout: action.timeout,
                };
                return (visits, Some(failure));
            }
        }
    }

    (visits, None)
}

/// Resolves once the manager has been torn down
async fn cancelled(signal: &mut watch::Receiver<bool>) {
    loop {
        let cancelled = *signal.borrow_and_update();
        if cancelled {
            return;
        }
        if signal.changed().await.is_err() {
            // The pool is gone, nobody can cancel any more
            std::future::pending::<()>().await;
        }
    }
}

/// Runs one sequence in a child task, aborting it on teardown
async fn run_sequence(
    slot: usize,
    site: &Site,
    browser: SharedBrowser,
    actions: Vec<Action>,
    signal: &mut watch::Receiver<bool>,
) -> (Vec<VisitData>, Option<SequenceError>) {
    let mut running = JoinSet::new();
    running.spawn(execute_sequence(browser, actions));

    let joined = tokio::select! {
        joined = running.join_next() => joined,
        _ = cancelled(signal) => None,
    };

    match joined {
        Some(Ok(result)) => result,
        Some(Err(join_error)) if join_error.is_panic() => {
            tracing::warn!(
                worker = slot,
                rank = site.rank(),
                error = %join_error,
                "sequence task died; relaunching browser"
            );
            (Vec::new(), Some(SequenceError::Panicked))
        }
        _ => {
            running.shutdown().await;
            (Vec::new(), Some(SequenceError::Cancelled))
        }
    }
}

pub(crate) async fn run_worker(
    slot: usize,
    config: WorkerConfig,
    browser: Box<dyn Browser>,
    mut jobs: mpsc::Receiver<Job>,
    shared: Arc<Shared>,
) {
    let mut browser: Option<SharedBrowser> = Some(Arc::new(Mutex::new(browser)));
    let mut signal = shared.cancel_signal();
    tracing::debug!(worker = slot, "worker started");

    while let Some(job) = jobs.recv().await {
        let Job {
            site,
            actions,
            callback,
            reply,
            permit,
        } = job;

        let started_at = Utc::now();
        let (visits, failure) = match &browser {
            _ if shared.is_cancelled() => (Vec::new(), Some(SequenceError::Cancelled)),
            Some(current) => {
                run_sequence(slot, &site, Arc::clone(current), actions, &mut signal).await
            }
            None => (
                Vec::new(),
                Some(SequenceError::WorkerFault("worker has no browser".to_string())),
            ),
        };

        match &failure {
            None => {}
            Some(SequenceError::Cancelled) => {
                tracing::debug!(worker = slot, rank = site.rank(), "sequence cancelled")
            }
            Some(err) => {
                match err {
                    SequenceError::Timeout { .. } => {
                        tracing::debug!(worker = slot, rank = site.rank(), "{}", err)
                    }
                    _ => tracing::warn!(worker = slot, rank = site.rank(), site = %site, "{}", err),
                }
                if *err == SequenceError::Panicked {
                    // The engine state is unknown after a panic; start fresh
                    if let Some(crashed) = browser.take() {
                        let _ = crashed.lock().await.close().await;
                    }
                }
                browser = recover_browser(slot, &config, browser, &shared).await;
            }
        }

        let outcome = Outcome {
            rank: site.rank(),
            site: site.to_string(),
            success: failure.is_none(),
            failure,
        };
        finish_sequence(slot, &site, outcome, visits, started_at, callback, reply, &shared);

        if browser.is_none() {
            tracing::error!(worker = slot, "browser could not be restarted; retiring worker");
            shared.retire(slot);
            permit.forget();
            break;
        }

        shared.release(slot);
        drop(permit);
    }

    if let Some(browser) = browser {
        if let Err(e) = browser.lock().await.close().await {
            tracing::warn!(worker = slot, "failed to close browser: {}", e);
        }
    }
    tracing::debug!(worker = slot, "worker stopped");
}

/// Resets the browser after a failed sequence, relaunching it if needed
async fn recover_browser(
    slot: usize,
    config: &WorkerConfig,
    browser: Option<SharedBrowser>,
    shared: &Shared,
) -> Option<SharedBrowser> {
    if let Some(browser) = browser {
        let mut current = browser.lock().await;
        match current.reset().await {
            Ok(()) => {
                drop(current);
                return Some(browser);
            }
            Err(e) => {
                tracing::warn!(worker = slot, "browser reset failed, relaunching: {}", e);
                let _ = current.close().await;
            }
        }
    }

    match shared.launcher.launch(config).await {
        Ok(browser) => Some(Arc::new(Mutex::new(browser))),
        Err(e) => {
            tracing::error!(worker = slot, "browser relaunch failed: {}", e);
            None
        }
    }
}

/// Records the outcome, fires the callback, and answers the handle
#[allow(clippy::too_many_arguments)]
fn finish_sequence(
    slot: usize,
    site: &Site,
    outcome: Outcome,
    visits: Vec<VisitData>,
    started_at: chrono::DateTime<Utc>,
    callback: Option<CompletionCallback>,
    reply: oneshot::Sender<Outcome>,
    shared: &Shared,
) {
    let record = VisitRecord {
        site_rank: site.rank(),
        site_url: site.to_string(),
        domain: site.domain(),
        worker_id: Some(slot),
        success: outcome.success,
        error: outcome.failure.as_ref().map(ToString::to_string),
        started_at,
        finished_at: Utc::now(),
        visits,
    };

    if let Err(e) = shared.storage.record(&record) {
        tracing::warn!(rank = site.rank(), "visit not recorded: {}", e);
        shared.warn(StorageWarning {
            rank: Some(site.rank()),
            message: e.to_string(),
        });
    }

    shared.record_outcome(outcome.success);

    if let Some(callback) = callback {
        let success = outcome.success;
        if catch_unwind(AssertUnwindSafe(move || callback(success))).is_err() {
            tracing::warn!(rank = site.rank(), "completion callback panicked");
        }
    }

    // The caller may have dropped its handle
    let _ = reply.send(outcome);
}

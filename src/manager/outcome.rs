use crate::command::ActionKind;
use crate::HarnessError;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Why a sequence did not succeed
///
/// These never propagate out of the manager; they travel inside an
/// [`Outcome`] and into the stored visit record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("{action} of {target} exceeded its {timeout:?} timeout")]
    Timeout {
        action: ActionKind,
        target: String,
        timeout: Duration,
    },

    #[error("worker fault: {0}")]
    WorkerFault(String),

    #[error("sequence panicked inside the browser engine")]
    Panicked,

    /// The manager was dropped before the sequence finished
    #[error("sequence cancelled by manager teardown")]
    Cancelled,
}

/// Result of one command sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub rank: usize,
    pub site: String,
    pub success: bool,
    pub failure: Option<SequenceError>,
}

/// Awaitable result of a submitted sequence
///
/// The completion callback still fires on the worker; this handle is for
/// callers that would rather await the outcome.
#[derive(Debug)]
pub struct SequenceHandle {
    rank: usize,
    rx: oneshot::Receiver<Outcome>,
}

impl SequenceHandle {
    pub(crate) fn new(rank: usize, rx: oneshot::Receiver<Outcome>) -> Self {
        Self { rank, rx }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Waits for the sequence to finish
    pub async fn wait(self) -> Result<Outcome, HarnessError> {
        self.rx
            .await
            .map_err(|_| HarnessError::WorkerLost { rank: self.rank })
    }
}

/// A storage failure that did not stop the crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageWarning {
    /// Rank of the site whose record was lost; None for failures at close
    pub rank: Option<usize>,
    pub message: String,
}

/// Summary returned by [`super::TaskManager::close`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub succeeded: usize,
    pub failed: usize,
    pub storage_warnings: Vec<StorageWarning>,
}

impl ShutdownReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

//! Storage traits and error types
//!
//! This module defines the contract the task manager consumes from a storage
//! backend, and the record it hands over for every finished sequence.

use crate::engine::VisitData;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage is closed")]
    Closed,

    #[error("Storage lock poisoned")]
    Poisoned,

    #[error("Crawl not found: {0}")]
    CrawlNotFound(i64),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome and instrumentation of one command sequence, keyed by site rank
#[derive(Debug, Clone)]
pub struct VisitRecord {
    pub site_rank: usize,
    pub site_url: String,
    pub domain: Option<String>,
    /// None when the site never reached a worker
    pub worker_id: Option<usize>,
    pub success: bool,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per action that completed
    pub visits: Vec<VisitData>,
}

/// Durable sink for visit records
///
/// Implementations are shared by every worker and must accept concurrent
/// `record` calls.
pub trait StorageProvider: Send + Sync {
    /// Persists one finished sequence
    fn record(&self, record: &VisitRecord) -> StorageResult<()>;

    /// Flushes outstanding state and releases the backend
    ///
    /// Calling `close` more than once is a no-op. `record` after `close`
    /// fails with [`StorageError::Closed`].
    fn close(&self) -> StorageResult<()>;
}

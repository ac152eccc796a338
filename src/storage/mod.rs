//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the harness, including:
//! - SQLite database initialization and schema management
//! - Crawl run tracking and worker configuration
//! - One visit record per finished command sequence, keyed by site rank
//! - Instrumentation rows (HTTP, cookies, navigations, DNS, scripts)

mod schema;
mod sqlite;
mod traits;

pub use schema::INSTRUMENT_TABLES;
pub use sqlite::SqliteStorage;
pub use traits::{StorageError, StorageProvider, StorageResult, VisitRecord};

/// Represents a crawl run in the database
#[derive(Debug, Clone)]
pub struct CrawlRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: CrawlStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStatus {
    Running,
    Completed,
    Interrupted,
}

impl CrawlStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }
}

/// A stored site visit, as read back for reporting
#[derive(Debug, Clone)]
pub struct SiteVisitRow {
    pub id: i64,
    pub crawl_id: i64,
    pub site_rank: usize,
    pub site_url: String,
    pub worker_id: Option<usize>,
    pub success: bool,
    pub error: Option<String>,
    pub final_url: Option<String>,
    pub status_code: Option<u16>,
    pub title: Option<String>,
}

//! Sitevisit: a site-visit orchestration harness
//!
//! This crate drives a bounded pool of instrumented browser workers through
//! ordered command sequences, one per target site, and persists what each
//! visit observed (HTTP exchanges, cookies, navigations, DNS, scripts) to SQLite.

pub mod command;
pub mod config;
pub mod crawler;
pub mod engine;
pub mod manager;
pub mod output;
pub mod site;
pub mod storage;

use thiserror::Error;

/// Main error type for harness operations
///
/// Only configuration and initialization failures reach the caller through
/// this type; per-sequence failures are reported as [`manager::Outcome`]s.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Engine error: {0}")]
    Engine(#[from] engine::EngineError),

    #[error("Task manager is closed")]
    ManagerClosed,

    #[error("No worker could be started ({requested} requested)")]
    NoWorkers { requested: usize },

    #[error("Worker dropped the sequence for site rank {rank} without reporting")]
    WorkerLost { rank: usize },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Path {path} is not writable: {reason}")]
    Unwritable { path: String, reason: String },
}

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use command::{build_sequence, Action, ActionKind, ActionSpec, CommandSequence};
pub use config::{Config, ManagerConfig, WorkerConfig};
pub use manager::{Outcome, SequenceHandle, ShutdownReport, TaskManager};
pub use site::{Site, SiteRegistry};

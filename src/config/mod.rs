//! Configuration module for sitevisit
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and assembling the immutable parameter sets handed to the task manager.
//!
//! # Example
//!
//! ```no_run
//! use sitevisit::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawl.toml")).unwrap();
//! println!("Crawl will use {} browsers", config.manager.num_browsers);
//! ```

mod assembly;
mod parser;
mod types;
mod validation;

// Re-export types
pub use assembly::{assemble, InstrumentFlags, ManagerConfig, StoragePaths, WorkerConfig, WorkerTemplate};
pub use types::{BrowserSection, Config, DisplayMode, ManagerSection, VisitSection, DEFAULT_SITES};

// Re-export parser functions
pub use parser::{compute_config_hash, default_config_with_hash, load_config, load_config_with_hash};
pub use validation::{validate, MAX_BROWSERS};
pub(crate) use validation::validate_site_url;

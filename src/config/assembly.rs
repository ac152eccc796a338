//! Assembly of the immutable parameter sets handed to the task manager
//!
//! Assembly is all-or-nothing: either every worker gets its configuration and
//! every storage path is known to be writable, or a [`ConfigError`] is
//! returned before any worker starts.

use crate::config::types::{BrowserSection, Config, DisplayMode};
use crate::config::validation::MAX_BROWSERS;
use crate::ConfigError;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

const WRITE_CHECK_NAME: &str = ".sitevisit-write-check";

/// Which observable side effects a worker records during a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstrumentFlags {
    pub http: bool,
    pub cookie: bool,
    pub navigation: bool,
    pub js: bool,
    pub dns: bool,
}

impl InstrumentFlags {
    /// Every instrument enabled
    pub fn all() -> Self {
        Self {
            http: true,
            cookie: true,
            navigation: true,
            js: true,
            dns: true,
        }
    }

    /// No instrument enabled; the worker only records success or failure
    pub fn none() -> Self {
        Self::default()
    }

    /// Names of the enabled instruments, in a fixed order
    pub fn enabled(&self) -> Vec<&'static str> {
        [
            ("http", self.http),
            ("cookie", self.cookie),
            ("navigation", self.navigation),
            ("js", self.js),
            ("dns", self.dns),
        ]
        .into_iter()
        .filter_map(|(name, on)| on.then_some(name))
        .collect()
    }
}

impl From<&BrowserSection> for InstrumentFlags {
    fn from(section: &BrowserSection) -> Self {
        Self {
            http: section.http_instrument,
            cookie: section.cookie_instrument,
            navigation: section.navigation_instrument,
            js: section.js_instrument,
            dns: section.dns_instrument,
        }
    }
}

/// Settings shared by every worker produced by [`assemble`]
#[derive(Debug, Clone)]
pub struct WorkerTemplate {
    pub instruments: InstrumentFlags,
    pub display_mode: DisplayMode,
    pub user_agent: String,
}

impl From<&BrowserSection> for WorkerTemplate {
    fn from(section: &BrowserSection) -> Self {
        Self {
            instruments: InstrumentFlags::from(section),
            display_mode: section.display_mode,
            user_agent: section.user_agent.clone(),
        }
    }
}

/// Configuration of a single pool worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Zero-indexed slot this configuration belongs to
    pub worker_id: usize,
    pub instruments: InstrumentFlags,
    pub display_mode: DisplayMode,
    pub user_agent: String,
}

/// Where the crawl writes its output
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub data_directory: PathBuf,
    pub log_path: PathBuf,
    pub database_path: PathBuf,
}

impl StoragePaths {
    /// Places the database under the data directory
    pub fn new(data_directory: impl Into<PathBuf>, log_path: impl Into<PathBuf>, database_name: &str) -> Self {
        let data_directory = data_directory.into();
        let database_path = data_directory.join(database_name);
        Self {
            data_directory,
            log_path: log_path.into(),
            database_path,
        }
    }
}

/// Immutable parameters for one task manager
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub data_directory: PathBuf,
    pub log_path: PathBuf,
    pub database_path: PathBuf,
    pub workers: Vec<WorkerConfig>,
}

impl ManagerConfig {
    /// Number of workers the pool is configured for
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Config {
    /// Storage paths described by the `[manager]` section
    pub fn storage_paths(&self) -> StoragePaths {
        StoragePaths::new(
            &self.manager.data_directory,
            &self.manager.log_path,
            &self.manager.database_name,
        )
    }

    /// Assembles the manager configuration described by this config
    pub fn manager_config(&self) -> Result<ManagerConfig, ConfigError> {
        assemble(
            self.manager.num_browsers as usize,
            self.storage_paths(),
            &WorkerTemplate::from(&self.browser),
        )
    }
}

/// Builds one [`ManagerConfig`] holding exactly `count` worker configurations
///
/// Creates the data directory and the log file's parent directory if they are
/// missing, and verifies that both the data directory and the log file can
/// be written.
///
/// # Returns
///
/// * `Ok(ManagerConfig)` - Complete configuration, paths verified
/// * `Err(ConfigError)` - Invalid count or unwritable path
pub fn assemble(
    count: usize,
    paths: StoragePaths,
    template: &WorkerTemplate,
) -> Result<ManagerConfig, ConfigError> {
    if count < 1 || count > MAX_BROWSERS as usize {
        return Err(ConfigError::Validation(format!(
            "worker count must be between 1 and {}, got {}",
            MAX_BROWSERS, count
        )));
    }

    ensure_writable_dir(&paths.data_directory)?;

    if let Some(parent) = paths.database_path.parent() {
        ensure_writable_dir(parent)?;
    }

    ensure_writable_file(&paths.log_path)?;

    let workers = (0..count)
        .map(|worker_id| WorkerConfig {
            worker_id,
            instruments: template.instruments,
            display_mode: template.display_mode,
            user_agent: template.user_agent.clone(),
        })
        .collect();

    Ok(ManagerConfig {
        data_directory: paths.data_directory,
        log_path: paths.log_path,
        database_path: paths.database_path,
        workers,
    })
}

fn unwritable(path: &Path, err: std::io::Error) -> ConfigError {
    ConfigError::Unwritable {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

/// Creates `dir` if needed and proves a file can be created inside it
fn ensure_writable_dir(dir: &Path) -> Result<(), ConfigError> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }

    std::fs::create_dir_all(dir).map_err(|e| unwritable(dir, e))?;

    let check = dir.join(WRITE_CHECK_NAME);
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&check)
        .map_err(|e| unwritable(dir, e))?;
    std::fs::remove_file(&check).map_err(|e| unwritable(dir, e))?;

    Ok(())
}

/// Creates the parent of `file` if needed and opens `file` for appending
fn ensure_writable_file(file: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| unwritable(parent, e))?;
        }
    }

    OpenOptions::new()
        .append(true)
        .create(true)
        .open(file)
        .map_err(|e| unwritable(file, e))?;

    Ok(())
}

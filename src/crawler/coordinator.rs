//! Crawl coordinator - wires configuration, storage and the task manager
//!
//! A crawl is one pass over the site registry: every site gets one command
//! sequence, the sequences are submitted to the task manager in rank order,
//! and the manager is always closed before the coordinator returns, whether
//! or not submission succeeded.

use crate::command::{build_sequence, ActionSpec};
use crate::config::{validate, Config, ManagerConfig};
use crate::engine::{BrowserLauncher, HttpLauncher};
use crate::manager::{SequenceHandle, StorageWarning, TaskManager};
use crate::site::{Site, SiteRegistry};
use crate::storage::{SqliteStorage, StorageProvider, VisitRecord};
use crate::{HarnessError, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Error stored for sites that never reached a worker
const NO_WORKER: &str = "no worker available";

/// Summary of a finished crawl
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub crawl_id: i64,
    pub sites: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Failed sites that never reached a worker
    pub unassigned: usize,
    pub storage_warnings: Vec<StorageWarning>,
    pub elapsed: Duration,
}

/// Crawl coordinator
///
/// Holds everything a crawl needs once configuration has been assembled:
/// the site registry, the visit template and an open storage provider.
pub struct Coordinator {
    manager_config: ManagerConfig,
    registry: SiteRegistry,
    specs: Vec<ActionSpec>,
    storage: Arc<SqliteStorage>,
    crawl_id: i64,
}

impl Coordinator {
    /// Assembles configuration and opens storage
    ///
    /// # Arguments
    ///
    /// * `config` - The crawl configuration
    /// * `config_hash` - Hash recorded with the crawl row
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Paths are writable and the crawl row exists
    /// * `Err(HarnessError)` - Configuration or storage failure
    pub fn new(config: &Config, config_hash: &str) -> Result<Self> {
        // Everything is checked before anything touches the disk
        validate(config)?;
        let registry = SiteRegistry::new(&config.sites)?;
        let manager_config = config.manager_config()?;

        let storage = SqliteStorage::open(&manager_config.database_path)?;
        let crawl_id = storage.begin_crawl(config_hash, &manager_config.workers)?;

        tracing::info!(
            crawl_id,
            database = %manager_config.database_path.display(),
            "storage opened"
        );

        Ok(Self {
            manager_config,
            registry,
            specs: vec![ActionSpec::from(&config.visit)],
            storage: Arc::new(storage),
            crawl_id,
        })
    }

    pub fn crawl_id(&self) -> i64 {
        self.crawl_id
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    /// Starts the task manager and visits every site
    ///
    /// If every worker retires part way through, the remaining sites are
    /// recorded as failed without a worker and the crawl is marked
    /// interrupted. The manager is still closed and a report returned.
    pub async fn run<L: BrowserLauncher>(self, launcher: L) -> Result<CrawlReport> {
        let start_time = Instant::now();
        let manager =
            TaskManager::start(&self.manager_config, launcher, self.storage.clone()).await?;

        tracing::info!(
            crawl_id = self.crawl_id,
            sites = self.registry.len(),
            workers = manager.worker_count(),
            "starting crawl"
        );

        let Submission {
            handles,
            unassigned,
        } = self.submit_all(&manager).await;

        let mut storage_warnings = Vec::new();
        if !unassigned.is_empty() {
            for site in &unassigned {
                storage_warnings.extend(self.record_unassigned(site));
            }
            if let Err(e) = self.storage.mark_interrupted() {
                tracing::warn!("failed to mark crawl interrupted: {}", e);
                storage_warnings.push(StorageWarning {
                    rank: None,
                    message: e.to_string(),
                });
            }
        }

        let shutdown = manager.close().await?;

        for handle in handles {
            let rank = handle.rank();
            if let Err(e) = handle.wait().await {
                tracing::warn!(rank, "no outcome for site: {}", e);
            }
        }

        for warning in &shutdown.storage_warnings {
            match warning.rank {
                Some(rank) => tracing::warn!(rank, "storage warning: {}", warning.message),
                None => tracing::warn!("storage warning: {}", warning.message),
            }
        }
        storage_warnings.extend(shutdown.storage_warnings);

        let report = CrawlReport {
            crawl_id: self.crawl_id,
            sites: self.registry.len(),
            succeeded: shutdown.succeeded,
            failed: shutdown.failed + unassigned.len(),
            unassigned: unassigned.len(),
            storage_warnings,
            elapsed: start_time.elapsed(),
        };

        if report.unassigned > 0 {
            tracing::warn!(
                "Crawl interrupted: {} succeeded, {} failed ({} never reached a worker) in {:?}",
                report.succeeded,
                report.failed,
                report.unassigned,
                report.elapsed
            );
        } else {
            tracing::info!(
                "Crawl completed: {} succeeded, {} failed in {:?}",
                report.succeeded,
                report.failed,
                report.elapsed
            );
        }

        Ok(report)
    }

    /// Submits every site in rank order
    ///
    /// A site whose worker vanished during dispatch is skipped. Once the pool
    /// has no workers left, that site and every later one are unassigned.
    async fn submit_all(&self, manager: &TaskManager) -> Submission {
        let mut handles = Vec::with_capacity(self.registry.len());
        let mut unassigned = Vec::new();
        let mut sites = self.registry.iter();

        while let Some(site) = sites.next() {
            let sequence = build_sequence(site.clone(), &self.specs, self.completion_logger(site));
            match manager.submit(sequence).await {
                Ok(handle) => handles.push(handle),
                Err(HarnessError::WorkerLost { rank }) => {
                    tracing::warn!(rank, "worker lost while dispatching site");
                    unassigned.push(site.clone());
                }
                Err(e) => {
                    tracing::error!(rank = site.rank(), "stopping submission: {}", e);
                    unassigned.push(site.clone());
                    unassigned.extend(sites.cloned());
                    break;
                }
            }
        }

        Submission {
            handles,
            unassigned,
        }
    }

    /// Stores a failed visit for a site no worker ever ran
    fn record_unassigned(&self, site: &Site) -> Option<StorageWarning> {
        tracing::warn!(rank = site.rank(), site = %site, "{}", NO_WORKER);
        let now = Utc::now();
        let record = VisitRecord {
            site_rank: site.rank(),
            site_url: site.to_string(),
            domain: site.domain(),
            worker_id: None,
            success: false,
            error: Some(NO_WORKER.to_string()),
            started_at: now,
            finished_at: now,
            visits: Vec::new(),
        };

        let warning = self.storage.record(&record).err().map(|e| {
            tracing::warn!(rank = site.rank(), "visit not recorded: {}", e);
            StorageWarning {
                rank: Some(site.rank()),
                message: e.to_string(),
            }
        });
        self.completion_logger(site)(false);
        warning
    }

    fn completion_logger(&self, site: &Site) -> impl FnOnce(bool) + Send + 'static {
        let label = match self.registry.entry(site.rank()) {
            Some(entry) => entry.to_string(),
            None => site.to_string(),
        };
        completion_logger(site.rank(), label)
    }
}

/// Sequences handed to the manager and sites left without a worker
struct Submission {
    handles: Vec<SequenceHandle>,
    unassigned: Vec<Site>,
}

/// Completion callback that logs the outcome of one site under its
/// configured name
fn completion_logger(rank: usize, label: String) -> impl FnOnce(bool) + Send + 'static {
    move |success| {
        let verdict = if success {
            "successfully"
        } else {
            "unsuccessfully"
        };
        tracing::info!(rank, "CommandSequence for {} ran {}", label, verdict);
    }
}

/// Runs a complete crawl with the bundled HTTP browser
///
/// # Arguments
///
/// * `config` - The crawl configuration
/// * `config_hash` - Hash of the configuration source, stored with the crawl
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The manager started and shut down
/// * `Err(HarnessError)` - Configuration or initialization failure
///
/// # Example
///
/// ```no_run
/// use sitevisit::config::load_config_with_hash;
/// use sitevisit::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("crawl.toml"))?;
/// let report = run_crawl(&config, &hash).await?;
/// println!("{} of {} sites visited", report.succeeded, report.sites);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: &Config, config_hash: &str) -> Result<CrawlReport> {
    run_crawl_with(config, config_hash, HttpLauncher).await
}

/// Runs a complete crawl with a caller-supplied browser launcher
pub async fn run_crawl_with<L: BrowserLauncher>(
    config: &Config,
    config_hash: &str,
    launcher: L,
) -> Result<CrawlReport> {
    Coordinator::new(config, config_hash)?.run(launcher).await
}

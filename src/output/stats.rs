//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::storage::{CrawlRecord, SiteVisitRow, SqliteStorage, StorageResult};

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Number of crawls recorded in the database
    pub total_crawls: u64,

    /// The crawl these statistics describe; None for an empty database
    pub crawl: Option<CrawlRecord>,

    /// Visits recorded for the crawl
    pub visits: u64,

    /// Visits whose command sequence succeeded
    pub successful_visits: u64,

    /// Row counts per instrumentation table
    pub instrument_counts: Vec<(&'static str, u64)>,

    /// Failed visits with their recorded error
    pub failures: Vec<SiteVisitRow>,
}

impl CrawlStatistics {
    pub fn failed_visits(&self) -> u64 {
        self.visits - self.successful_visits
    }

    /// Share of visits that succeeded, in percent
    pub fn success_rate(&self) -> f64 {
        if self.visits > 0 {
            (self.successful_visits as f64 / self.visits as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Loads statistics for the most recent crawl
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(storage: &SqliteStorage) -> StorageResult<CrawlStatistics> {
    let total_crawls = storage.count_crawls()?;

    let Some(crawl) = storage.latest_crawl()? else {
        return Ok(CrawlStatistics {
            total_crawls,
            crawl: None,
            visits: 0,
            successful_visits: 0,
            instrument_counts: Vec::new(),
            failures: Vec::new(),
        });
    };

    let visits = storage.count_visits(crawl.id, None)?;
    let successful_visits = storage.count_visits(crawl.id, Some(true))?;
    let instrument_counts = storage.instrument_counts(crawl.id)?;
    let failures = storage
        .visits(crawl.id)?
        .into_iter()
        .filter(|v| !v.success)
        .collect();

    Ok(CrawlStatistics {
        total_crawls,
        crawl: Some(crawl),
        visits,
        successful_visits,
        instrument_counts,
        failures,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Crawls recorded: {}", stats.total_crawls);

    let Some(crawl) = &stats.crawl else {
        println!("  No crawl has been recorded yet");
        return;
    };

    println!(
        "  Latest crawl: #{} ({})",
        crawl.id,
        crawl.status.to_db_string()
    );
    println!("  Started: {}", crawl.started_at);
    if let Some(finished) = &crawl.finished_at {
        println!("  Finished: {}", finished);
    }
    println!();

    println!("Instrumentation:");
    for (table, count) in &stats.instrument_counts {
        println!("  {}: {}", table, count);
    }
    println!();

    if !stats.failures.is_empty() {
        println!("Failed Sites ({}):", stats.failures.len());
        for visit in &stats.failures {
            println!(
                "  - #{} {}: {}",
                visit.site_rank,
                visit.site_url,
                visit.error.as_deref().unwrap_or("unknown error")
            );
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} sites visited successfully)",
        stats.success_rate(),
        stats.successful_visits,
        stats.visits
    );
}

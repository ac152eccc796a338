//! Crawler module - the orchestration entry point
//!
//! This module turns a [`Config`](crate::config::Config) into a finished crawl:
//! - Validating the site list and assembling the manager configuration
//! - Opening the SQLite store and recording the crawl and its workers
//! - Starting the task manager and submitting one sequence per site
//! - Closing the manager on every exit path and reporting the outcome

mod coordinator;

pub use coordinator::{run_crawl, run_crawl_with, Coordinator, CrawlReport};

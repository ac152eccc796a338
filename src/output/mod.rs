//! Output module for reporting on stored crawls
//!
//! This module reads the crawl database back and prints a summary of the
//! most recent crawl for the `--stats` mode of the binary.

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};

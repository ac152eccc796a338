//! Browser engine seam
//!
//! The task manager never talks to a concrete automation engine. It launches
//! one [`Browser`] per worker slot through a [`BrowserLauncher`] and asks it to
//! fetch targets, reset after a failure, and close at shutdown. Everything a
//! browser observed during a fetch comes back as [`VisitData`].
//!
//! [`HttpBrowser`] is the bundled engine: an HTTP client that follows
//! redirects by hand so it can record each hop.

mod http;
mod instrument;

pub use http::{HttpBrowser, HttpLauncher, MAX_REDIRECTS};
pub use instrument::{extract_scripts, extract_title, parse_set_cookie, resolve_host};

use crate::config::WorkerConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

/// Errors raised by a browser engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Failed to launch browser {worker_id}: {message}")]
    Launch { worker_id: usize, message: String },

    #[error("Too many redirects from {url}")]
    TooManyRedirects { url: String },

    #[error("Invalid redirect from {url}: {message}")]
    InvalidRedirect { url: String, message: String },

    #[error("Browser is closed")]
    Closed,
}

/// One instrumented browser instance owned by a worker slot
#[async_trait]
pub trait Browser: Send {
    /// Loads `url` and returns what the enabled instruments observed
    async fn fetch(&mut self, url: &Url) -> Result<VisitData, EngineError>;

    /// Returns the browser to a clean state after a failed or aborted action
    async fn reset(&mut self) -> Result<(), EngineError>;

    /// Releases the browser's resources; later calls are no-ops
    async fn close(&mut self) -> Result<(), EngineError>;
}

/// Starts browsers for worker slots
#[async_trait]
pub trait BrowserLauncher: Send + Sync + 'static {
    async fn launch(&self, config: &WorkerConfig) -> Result<Box<dyn Browser>, EngineError>;
}

/// Everything recorded while fetching one target
#[derive(Debug, Clone, Default)]
pub struct VisitData {
    pub requested_url: String,
    pub final_url: Option<String>,
    pub status_code: Option<u16>,
    pub title: Option<String>,
    pub http: Vec<HttpExchange>,
    pub cookies: Vec<CookieRecord>,
    pub navigations: Vec<Navigation>,
    pub dns: Vec<DnsRecord>,
    pub scripts: Vec<ScriptRecord>,
}

impl VisitData {
    pub fn new(requested: &Url) -> Self {
        Self {
            requested_url: requested.to_string(),
            ..Self::default()
        }
    }
}

/// One request/response pair
#[derive(Debug, Clone)]
pub struct HttpExchange {
    pub method: String,
    pub url: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub header_count: usize,
    /// `Location` target when the response was a redirect
    pub redirect_to: Option<String>,
    pub observed_at: DateTime<Utc>,
}

/// A cookie set by a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieRecord {
    pub origin_url: String,
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<String>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
}

/// A top-level navigation, including each redirect hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub from_url: Option<String>,
    pub to_url: String,
    pub status_code: u16,
}

/// Result of resolving one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub hostname: String,
    pub addresses: Vec<String>,
    pub error: Option<String>,
}

/// A script referenced or embedded by a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRecord {
    pub page_url: String,
    /// Absolute URL of an external script
    pub src: Option<String>,
    /// Byte length of an inline script
    pub inline_length: Option<usize>,
    /// Hex SHA-256 of an inline script's body
    pub digest: Option<String>,
}

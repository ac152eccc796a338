use serde::Deserialize;

/// Sites visited when a configuration does not list its own
pub const DEFAULT_SITES: &[&str] = &[
    "https://www.amazon.es",
    "https://www.elcorteingles.es",
    "https://www.mediamarkt.es",
    "https://www.uoc.edu",
    "https://www.microsoft.com",
];

/// Main configuration structure for a sitevisit crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub manager: ManagerSection,
    #[serde(default)]
    pub browser: BrowserSection,
    #[serde(default)]
    pub visit: VisitSection,
    #[serde(default = "default_sites")]
    pub sites: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manager: ManagerSection::default(),
            browser: BrowserSection::default(),
            visit: VisitSection::default(),
            sites: default_sites(),
        }
    }
}

fn default_sites() -> Vec<String> {
    DEFAULT_SITES.iter().map(|s| s.to_string()).collect()
}

/// Task manager configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagerSection {
    /// Number of browser workers in the pool
    #[serde(rename = "num-browsers")]
    pub num_browsers: u32,

    /// Directory holding the crawl database and log
    #[serde(rename = "data-directory")]
    pub data_directory: String,

    /// Path of the side-channel text log
    #[serde(rename = "log-path")]
    pub log_path: String,

    /// File name of the SQLite database inside the data directory
    #[serde(rename = "database-name")]
    pub database_name: String,
}

impl Default for ManagerSection {
    fn default() -> Self {
        Self {
            num_browsers: 2,
            data_directory: "./datadir".to_string(),
            log_path: "./datadir/crawl.log".to_string(),
            database_name: "crawl-data.sqlite".to_string(),
        }
    }
}

/// Browser display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Headless,
    Headed,
}

impl DisplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Headless => "headless",
            Self::Headed => "headed",
        }
    }
}

/// Per-browser instrumentation settings, applied to every worker
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    #[serde(rename = "display-mode")]
    pub display_mode: DisplayMode,

    #[serde(rename = "http-instrument")]
    pub http_instrument: bool,

    #[serde(rename = "cookie-instrument")]
    pub cookie_instrument: bool,

    #[serde(rename = "navigation-instrument")]
    pub navigation_instrument: bool,

    #[serde(rename = "js-instrument")]
    pub js_instrument: bool,

    #[serde(rename = "dns-instrument")]
    pub dns_instrument: bool,

    /// User-Agent header sent by every worker
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            display_mode: DisplayMode::Headless,
            http_instrument: true,
            cookie_instrument: true,
            navigation_instrument: true,
            js_instrument: true,
            dns_instrument: true,
            user_agent: format!("sitevisit/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Settings for the fetch action issued against every site
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisitSection {
    /// Seconds to idle on the page after it loads
    #[serde(rename = "sleep-secs")]
    pub sleep_secs: u64,

    /// Seconds before the fetch action (load + idle) is aborted
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for VisitSection {
    fn default() -> Self {
        Self {
            sleep_secs: 3,
            timeout_secs: 60,
        }
    }
}

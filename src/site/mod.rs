//! Site registry
//!
//! An ordered list of target sites. A site's rank is its zero-indexed position
//! in the registry and is the key under which its outcome and its
//! instrumentation records are stored.

use crate::config::validate_site_url;
use crate::ConfigError;
use std::fmt;
use url::Url;

/// A target site and its rank in the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    url: Url,
    rank: usize,
}

impl Site {
    /// Creates a site from an already validated URL
    pub fn new(url: Url, rank: usize) -> Self {
        Self { url, rank }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Lowercase host of the site, if any
    pub fn domain(&self) -> Option<String> {
        extract_domain(&self.url)
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Ordered, immutable list of sites
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: Vec<Site>,
    /// Entries exactly as configured, before URL normalization
    entries: Vec<String>,
}

impl SiteRegistry {
    /// Builds a registry, assigning ranks by position
    ///
    /// # Returns
    ///
    /// * `Ok(SiteRegistry)` - Every entry is an http(s) URL with a host
    /// * `Err(ConfigError)` - The first entry that failed validation
    pub fn new<I, S>(urls: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries: Vec<String> = urls.into_iter().map(|raw| raw.as_ref().to_string()).collect();
        let sites = entries
            .iter()
            .enumerate()
            .map(|(rank, raw)| validate_site_url(raw).map(|url| Site::new(url, rank)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { sites, entries })
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Looks up a site by rank
    pub fn get(&self, rank: usize) -> Option<&Site> {
        self.sites.get(rank)
    }

    /// The configured text of the site at `rank`
    pub fn entry(&self, rank: usize) -> Option<&str> {
        self.entries.get(rank).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Site> {
        self.sites.iter()
    }
}

impl<'a> IntoIterator for &'a SiteRegistry {
    type Item = &'a Site;
    type IntoIter = std::slice::Iter<'a, Site>;

    fn into_iter(self) -> Self::IntoIter {
        self.sites.iter()
    }
}

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sitevisit::site::extract_domain;
///
/// let url = Url::parse("https://WWW.Example.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("www.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

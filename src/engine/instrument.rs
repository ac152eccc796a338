//! Instrument helpers: cookie parsing, script and title extraction, DNS
//!
//! These run inside [`super::HttpBrowser`] but are plain functions so they
//! can be tested without a network.

use crate::engine::{CookieRecord, DnsRecord, ScriptRecord};
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use url::Url;

/// Parses one `Set-Cookie` header value
///
/// Returns None when the header has no `name=value` pair.
///
/// # Example
///
/// ```
/// use url::Url;
/// use sitevisit::engine::parse_set_cookie;
///
/// let origin = Url::parse("https://example.com/").unwrap();
/// let cookie = parse_set_cookie("sid=abc; Path=/; Secure; HttpOnly", &origin).unwrap();
/// assert_eq!(cookie.name, "sid");
/// assert!(cookie.secure && cookie.http_only);
/// ```
pub fn parse_set_cookie(header: &str, origin: &Url) -> Option<CookieRecord> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = CookieRecord {
        origin_url: origin.to_string(),
        name: name.to_string(),
        value: value.trim().trim_matches('"').to_string(),
        domain: None,
        path: None,
        expires: None,
        max_age: None,
        secure: false,
        http_only: false,
        same_site: None,
    };

    for attribute in parts {
        let (key, val) = match attribute.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (attribute.trim(), None),
        };

        match key.to_ascii_lowercase().as_str() {
            "domain" => cookie.domain = val.map(|v| v.trim_start_matches('.').to_lowercase()),
            "path" => cookie.path = val.map(str::to_string),
            "expires" => cookie.expires = val.map(str::to_string),
            "max-age" => cookie.max_age = val.and_then(|v| v.parse().ok()),
            "secure" => cookie.secure = true,
            "httponly" => cookie.http_only = true,
            "samesite" => cookie.same_site = val.map(str::to_string),
            _ => {}
        }
    }

    Some(cookie)
}

/// Extracts the page title from HTML
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Lists the scripts a page loads or embeds
///
/// External scripts are resolved against `page_url`; unresolvable `src`
/// values are skipped. Inline scripts are recorded by length and SHA-256.
pub fn extract_scripts(html: &str, page_url: &Url) -> Vec<ScriptRecord> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("script") else {
        return Vec::new();
    };

    let mut scripts = Vec::new();
    for element in document.select(&selector) {
        if let Some(src) = element.value().attr("src") {
            if let Ok(resolved) = page_url.join(src.trim()) {
                scripts.push(ScriptRecord {
                    page_url: page_url.to_string(),
                    src: Some(resolved.to_string()),
                    inline_length: None,
                    digest: None,
                });
            }
            continue;
        }

        let body: String = element.text().collect();
        if body.trim().is_empty() {
            continue;
        }

        let mut hasher = Sha256::new();
        hasher.update(body.as_bytes());
        scripts.push(ScriptRecord {
            page_url: page_url.to_string(),
            src: None,
            inline_length: Some(body.len()),
            digest: Some(hex::encode(hasher.finalize())),
        });
    }

    scripts
}

/// Resolves `host` and records the addresses, or the lookup error
pub async fn resolve_host(host: &str, port: u16) -> DnsRecord {
    match tokio::net::lookup_host((host, port)).await {
        Ok(addrs) => {
            let mut addresses: Vec<String> = addrs.map(|a| a.ip().to_string()).collect();
            addresses.sort();
            addresses.dedup();
            DnsRecord {
                hostname: host.to_string(),
                addresses,
                error: None,
            }
        }
        Err(e) => DnsRecord {
            hostname: host.to_string(),
            addresses: Vec::new(),
            error: Some(e.to_string()),
        },
    }
}

//! HTTP-backed browser engine
//!
//! Each fetch walks the redirect chain by hand (at most [`MAX_REDIRECTS`]
//! hops) so that every hop can be recorded by the enabled instruments:
//! - http: one [`HttpExchange`] per response
//! - cookie: every `Set-Cookie` header
//! - navigation: each hop of the chain
//! - dns: one lookup per distinct host
//! - js: scripts referenced or embedded by the final HTML page

use crate::config::{DisplayMode, WorkerConfig};
use crate::engine::instrument::{extract_scripts, extract_title, parse_set_cookie, resolve_host};
use crate::engine::{Browser, BrowserLauncher, EngineError, HttpExchange, Navigation, VisitData};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{CONTENT_TYPE, LOCATION, SET_COOKIE};
use reqwest::{redirect::Policy, Client};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// Maximum number of redirects followed before a fetch fails
pub const MAX_REDIRECTS: usize = 10;

/// Builds the HTTP client a browser uses
///
/// Redirects are disabled so [`HttpBrowser::fetch`] can follow them itself.
/// There is no overall request timeout; the task manager bounds every action.
fn build_http_client(config: &WorkerConfig) -> Result<Client, EngineError> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
        .map_err(|e| EngineError::Launch {
            worker_id: config.worker_id,
            message: e.to_string(),
        })
}

/// An instrumented browser speaking plain HTTP
pub struct HttpBrowser {
    config: WorkerConfig,
    client: Option<Client>,
}

impl HttpBrowser {
    pub fn new(config: WorkerConfig) -> Result<Self, EngineError> {
        if config.display_mode == DisplayMode::Headed {
            tracing::debug!(
                worker = config.worker_id,
                "headed display requested; the HTTP engine always runs headless"
            );
        }

        let client = build_http_client(&config)?;
        Ok(Self {
            config,
            client: Some(client),
        })
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn fetch(&mut self, url: &Url) -> Result<VisitData, EngineError> {
        let client = self.client.as_ref().ok_or(EngineError::Closed)?;
        let instruments = self.config.instruments;

        let mut data = VisitData::new(url);
        let mut current = url.clone();
        let mut previous: Option<String> = None;
        let mut resolved_hosts = HashSet::new();

        for _ in 0..=MAX_REDIRECTS {
            if instruments.dns {
                if let Some(host) = current.host_str() {
                    if resolved_hosts.insert(host.to_string()) {
                        let port = current.port_or_known_default().unwrap_or(80);
                        data.dns.push(resolve_host(host, port).await);
                    }
                }
            }

            let response = client
                .get(current.clone())
                .send()
                .await
                .map_err(|source| EngineError::Http {
                    url: current.to_string(),
                    source,
                })?;

            let status = response.status();
            let headers = response.headers();
            let content_type = headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let location = if status.is_redirection() {
                headers
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            } else {
                None
            };

            if instruments.http {
                data.http.push(HttpExchange {
                    method: "GET".to_string(),
                    url: current.to_string(),
                    status_code: status.as_u16(),
                    content_type: content_type.clone(),
                    header_count: headers.len(),
                    redirect_to: location.clone(),
                    observed_at: Utc::now(),
                });
            }

            if instruments.cookie {
                data.cookies.extend(
                    headers
                        .get_all(SET_COOKIE)
                        .iter()
                        .filter_map(|v| v.to_str().ok())
                        .filter_map(|v| parse_set_cookie(v, &current)),
                );
            }

            if instruments.navigation {
                data.navigations.push(Navigation {
                    from_url: previous.clone(),
                    to_url: current.to_string(),
                    status_code: status.as_u16(),
                });
            }

            if status.is_redirection() {
                let location = location.ok_or_else(|| EngineError::InvalidRedirect {
                    url: current.to_string(),
                    message: format!("HTTP {} without a Location header", status.as_u16()),
                })?;
                let next = current
                    .join(&location)
                    .map_err(|e| EngineError::InvalidRedirect {
                        url: current.to_string(),
                        message: format!("bad Location '{}': {}", location, e),
                    })?;

                tracing::trace!(from = %current, to = %next, "following redirect");
                previous = Some(current.to_string());
                current = next;
                continue;
            }

            data.final_url = Some(current.to_string());
            data.status_code = Some(status.as_u16());

            let is_html = content_type
                .as_deref()
                .map_or(false, |ct| ct.contains("text/html"));
            if is_html {
                let body = response.text().await.map_err(|source| EngineError::Http {
                    url: current.to_string(),
                    source,
                })?;
                data.title = extract_title(&body);
                if instruments.js {
                    data.scripts = extract_scripts(&body, &current);
                }
            }

            return Ok(data);
        }

        Err(EngineError::TooManyRedirects {
            url: url.to_string(),
        })
    }

    async fn reset(&mut self) -> Result<(), EngineError> {
        if self.client.is_none() {
            return Err(EngineError::Closed);
        }
        // A fresh client drops pooled connections and any in-flight state
        self.client = Some(build_http_client(&self.config)?);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        self.client = None;
        Ok(())
    }
}

/// Launches an [`HttpBrowser`] per worker
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpLauncher;

#[async_trait]
impl BrowserLauncher for HttpLauncher {
    async fn launch(&self, config: &WorkerConfig) -> Result<Box<dyn Browser>, EngineError> {
        Ok(Box::new(HttpBrowser::new(config.clone())?))
    }
}

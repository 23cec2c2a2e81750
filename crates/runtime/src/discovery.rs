//! Polling the local discovery endpoint until a target is attachable.
//!
//! A starting process is not immediately debuggable: the discovery HTTP
//! endpoint begins answering some time after spawn, and the websocket URL
//! appears in `/json/version` later still. [`EndpointWaiter`] turns
//! "a process may be starting" into a concrete [`DebuggerEndpoint`], or a
//! timeout error carrying the elapsed time and the endpoint it polled.
//!
//! Web mode needs a second phase: the browser-level endpoint resolves first,
//! then `/json/list` is polled until a page target matching the configured
//! URL shows up.

use std::time::Duration;

use tokio::time::Instant;

use tether_protocol::{TargetInfo, VersionInfo};

use crate::error::{Error, Result};

/// A live debugger connection locator. Transient: re-created per attach
/// attempt, never persisted.
#[derive(Debug, Clone)]
pub struct DebuggerEndpoint {
    /// Websocket debugger URL to connect to.
    pub ws_url: String,
    /// Discovery port the endpoint was resolved from.
    pub port: u16,
    /// Target id when the endpoint refers to a specific page.
    pub target_id: Option<String>,
}

/// Sequential poller for the local discovery endpoint.
pub struct EndpointWaiter {
    port: u16,
    interval: Duration,
    timeout: Duration,
    client: reqwest::Client,
}

impl EndpointWaiter {
    /// Creates a waiter polling `port` every `interval`, giving up after
    /// `timeout`.
    pub fn new(port: u16, interval: Duration, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(400))
            .build()
            .map_err(|e| Error::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            port,
            interval,
            timeout,
            client,
        })
    }

    fn version_url(&self) -> String {
        format!("http://127.0.0.1:{}/json/version", self.port)
    }

    fn list_url(&self) -> String {
        format!("http://127.0.0.1:{}/json/list", self.port)
    }

    /// Polls `/json/version` until it contains a websocket debugger URL.
    ///
    /// Cancellation is timeout-only by design; there is no external cancel
    /// signal.
    pub async fn wait_for_endpoint(&self) -> Result<DebuggerEndpoint> {
        let started = Instant::now();
        let deadline = started + self.timeout;

        loop {
            if let Some(info) = self.fetch_version().await {
                if let Some(ws_url) = info.web_socket_debugger_url {
                    tracing::debug!(
                        url = %ws_url,
                        browser = info.browser.as_deref().unwrap_or("unknown"),
                        "discovery endpoint resolved"
                    );
                    return Ok(DebuggerEndpoint {
                        ws_url,
                        port: self.port,
                        target_id: None,
                    });
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::DiscoveryTimeout {
                    endpoint: self.version_url(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Polls `/json/list` until an open page target matches `wanted_url`.
    ///
    /// Matching is exact, prefix, or same-host (see [`match_target`]). Uses
    /// its own timeout, independent of the version-endpoint phase.
    pub async fn wait_for_page_target(
        &self,
        wanted_url: &str,
        timeout: Duration,
    ) -> Result<DebuggerEndpoint> {
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            for target in self.fetch_targets().await.unwrap_or_default() {
                if !target.is_page() || !match_target(&target.url, wanted_url) {
                    continue;
                }
                let Some(ws_url) = target.web_socket_debugger_url else {
                    tracing::debug!(
                        url = %target.url,
                        "matching page target has no debugger URL (another client attached?)"
                    );
                    continue;
                };
                tracing::debug!(url = %target.url, id = %target.id, "page target matched");
                return Ok(DebuggerEndpoint {
                    ws_url,
                    port: self.port,
                    target_id: Some(target.id),
                });
            }

            if Instant::now() >= deadline {
                return Err(Error::TargetSearchTimeout {
                    wanted: wanted_url.to_string(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One `/json/version` probe. `None` covers both "nothing listening yet"
    /// and "listening but not parseable yet" - the loop treats them alike.
    async fn fetch_version(&self) -> Option<VersionInfo> {
        // Some targets bind only one loopback flavor.
        for url in [
            self.version_url(),
            format!("http://localhost:{}/json/version", self.port),
        ] {
            let response = match self.client.get(&url).send().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::trace!(url = %url, error = %e, "discovery probe failed");
                    continue;
                }
            };
            if !response.status().is_success() {
                continue;
            }
            match response.json::<VersionInfo>().await {
                Ok(info) => return Some(info),
                Err(e) => {
                    tracing::trace!(url = %url, error = %e, "discovery payload unparseable");
                    continue;
                }
            }
        }
        None
    }

    async fn fetch_targets(&self) -> Option<Vec<TargetInfo>> {
        let response = self.client.get(self.list_url()).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json::<Vec<TargetInfo>>().await.ok()
    }
}

/// True when `candidate` (a live page URL) matches `wanted` (the configured
/// target URL): exact, prefix, or same-host.
pub fn match_target(candidate: &str, wanted: &str) -> bool {
    if candidate == wanted || candidate.starts_with(wanted) {
        return true;
    }
    match (url::Url::parse(candidate), url::Url::parse(wanted)) {
        (Ok(a), Ok(b)) => match (a.host_str(), b.host_str()) {
            (Some(ha), Some(hb)) => ha == hb,
            _ => false,
        },
        _ => false,
    }
}

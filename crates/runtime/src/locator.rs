//! Producing a debuggable target for the active attach mode.
//!
//! The locator is tiered: each tier either yields a [`DebuggerEndpoint`],
//! skips (its prerequisite is absent, e.g. no executable installed), or
//! fails (it started something that never became ready). Skips and failures
//! both advance to the next tier; only exhausting every tier is fatal, and
//! the resulting error reports what each tier did so the user gets an
//! actionable message instead of a bare timeout.
//!
//! Path probing is data-driven: ordered candidate lists evaluated
//! first-match-wins, so adding a platform or an install path is a list edit,
//! not new branching.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::discovery::{DebuggerEndpoint, EndpointWaiter};
use crate::error::{Error, Result};

/// How a debuggable target is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttachMode {
    /// Launch a regular browser against the target URL.
    Web,
    /// Spawn the application's own executable with debug flags.
    Executable,
    /// Ask the OS to launch via a protocol URL (e.g. a Steam `run` link).
    ProtocolLaunch,
    /// Assume an already-listening process and poll directly.
    Attach,
}

/// Everything the locator needs, built once from configuration.
#[derive(Debug, Clone)]
pub struct LocatorConfig {
    pub mode: AttachMode,
    /// Fixed remote debugging port.
    pub debug_port: u16,
    /// Page URL to find among open targets (web mode).
    pub target_url: Option<String>,
    /// Explicit browser executable (web mode).
    pub browser_override: Option<PathBuf>,
    /// Explicit application executable (executable mode).
    pub executable_override: Option<PathBuf>,
    /// Default install paths probed after the override, in order.
    pub executable_candidates: Vec<PathBuf>,
    /// OS protocol URL for launcher-mediated starts.
    pub launch_url: Option<String>,
    /// Dedicated profile directory for launched browsers.
    pub profile_dir: Option<PathBuf>,
    /// Discovery endpoint poll interval.
    pub poll_interval: Duration,
    /// Deadline for the discovery endpoint to produce a websocket URL.
    pub discovery_timeout: Duration,
    /// Deadline for the page-target search phase (web mode).
    pub target_timeout: Duration,
    /// Deadline for a spawned executable to announce its debugger URL.
    pub launch_timeout: Duration,
}

/// Outcome of one locate tier.
enum TierOutcome {
    /// The tier produced a usable endpoint.
    Ready(DebuggerEndpoint),
    /// The tier's prerequisite is absent; nothing was started.
    Skipped(String),
    /// The tier started something that never became ready.
    Failed(String),
}

type TierFuture<'a> = Pin<Box<dyn Future<Output = TierOutcome> + Send + 'a>>;
type TierFn<'a> = Box<dyn FnOnce() -> TierFuture<'a> + Send + 'a>;

/// Runs tiers in order, returning the first endpoint. Advancement is
/// strictly forward; a failed tier never re-runs an earlier one.
async fn run_tiers(tiers: Vec<(&'static str, TierFn<'_>)>, hint: &str) -> Result<DebuggerEndpoint> {
    let mut report = Vec::new();
    for (label, tier) in tiers {
        tracing::debug!(tier = label, "trying locate tier");
        match tier().await {
            TierOutcome::Ready(endpoint) => {
                tracing::info!(tier = label, url = %endpoint.ws_url, "target located");
                return Ok(endpoint);
            }
            TierOutcome::Skipped(why) => {
                tracing::debug!(tier = label, reason = %why, "tier skipped");
                report.push(format!("  {label}: skipped - {why}"));
            }
            TierOutcome::Failed(why) => {
                tracing::warn!(tier = label, reason = %why, "tier failed");
                report.push(format!("  {label}: failed - {why}"));
            }
        }
    }
    Err(Error::TargetNotFound(format!(
        "{}\nhint: {hint}",
        report.join("\n")
    )))
}

/// Determines how to obtain a live debuggable target for the current
/// OS/mode, then does so.
pub struct ProcessLocator {
    config: LocatorConfig,
}

impl ProcessLocator {
    pub fn new(config: LocatorConfig) -> Self {
        Self { config }
    }

    /// Produces a debugger endpoint for the configured attach mode.
    ///
    /// Executable mode falls through to a protocol launch when the binary is
    /// missing or dies before announcing its debugger URL.
    pub async fn locate(&self) -> Result<DebuggerEndpoint> {
        match self.config.mode {
            AttachMode::Web => {
                run_tiers(
                    vec![(
                        "web browser",
                        Box::new(|| Box::pin(self.tier_web()) as TierFuture<'_>) as TierFn<'_>,
                    )],
                    "install Chrome/Chromium or set an explicit browser path",
                )
                .await
            }
            AttachMode::Executable => {
                run_tiers(
                    vec![
                        (
                            "native executable",
                            Box::new(|| Box::pin(self.tier_executable()) as TierFuture<'_>) as TierFn<'_>,
                        ),
                        (
                            "protocol launch",
                            Box::new(|| Box::pin(self.tier_protocol_launch()) as TierFuture<'_>) as TierFn<'_>,
                        ),
                    ],
                    "is the launcher running? A protocol launch needs it active",
                )
                .await
            }
            AttachMode::ProtocolLaunch => {
                run_tiers(
                    vec![(
                        "protocol launch",
                        Box::new(|| Box::pin(self.tier_protocol_launch()) as TierFuture<'_>) as TierFn<'_>,
                    )],
                    "is the launcher running? A protocol launch needs it active",
                )
                .await
            }
            AttachMode::Attach => {
                let port = self.config.debug_port;
                run_tiers(
                    vec![("attach", Box::new(|| Box::pin(self.tier_attach()) as TierFuture<'_>) as TierFn<'_>)],
                    &format!("start the target with --remote-debugging-port={port} and retry"),
                )
                .await
            }
        }
    }

    fn waiter(&self) -> Result<EndpointWaiter> {
        EndpointWaiter::new(
            self.config.debug_port,
            self.config.poll_interval,
            self.config.discovery_timeout,
        )
    }

    /// Tier: launch a browser with a dedicated profile, then find the page.
    async fn tier_web(&self) -> TierOutcome {
        let Some(wanted) = self.config.target_url.clone() else {
            return TierOutcome::Failed("web mode requires a target URL".to_string());
        };
        let Some(browser) = resolve_browser(self.config.browser_override.as_deref()) else {
            return TierOutcome::Skipped(
                "no browser executable found on this system".to_string(),
            );
        };
        let profile = match self.profile_dir() {
            Ok(dir) => dir,
            Err(e) => return TierOutcome::Failed(format!("profile directory: {e}")),
        };

        let mut cmd = std::process::Command::new(&browser);
        cmd.arg(format!("--remote-debugging-port={}", self.config.debug_port))
            .arg(format!("--user-data-dir={}", profile.display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg(&wanted);
        if let Err(e) = spawn_detached(cmd) {
            return TierOutcome::Failed(format!(
                "failed to launch {}: {e}",
                browser.display()
            ));
        }

        let waiter = match self.waiter() {
            Ok(w) => w,
            Err(e) => return TierOutcome::Failed(e.to_string()),
        };
        if let Err(e) = waiter.wait_for_endpoint().await {
            return TierOutcome::Failed(e.to_string());
        }
        match waiter
            .wait_for_page_target(&wanted, self.config.target_timeout)
            .await
        {
            Ok(endpoint) => TierOutcome::Ready(endpoint),
            Err(e) => TierOutcome::Failed(e.to_string()),
        }
    }

    /// Tier: spawn the application binary and read the announced URL from
    /// its diagnostic stream.
    async fn tier_executable(&self) -> TierOutcome {
        let mut probes = Vec::new();
        if let Some(path) = &self.config.executable_override {
            probes.push(path.clone());
        }
        probes.extend(self.config.executable_candidates.iter().cloned());

        let Some(exe) = first_existing(&probes) else {
            return TierOutcome::Skipped(
                "executable not found at any configured path".to_string(),
            );
        };

        match self.launch_and_read_announce(&exe).await {
            Ok(endpoint) => TierOutcome::Ready(endpoint),
            Err(e) => TierOutcome::Failed(e.to_string()),
        }
    }

    async fn launch_and_read_announce(&self, exe: &Path) -> Result<DebuggerEndpoint> {
        let what = exe.display().to_string();
        let mut child = tokio::process::Command::new(exe)
            .arg(format!("--remote-debugging-port={}", self.config.debug_port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::LaunchFailed {
                what: what.clone(),
                reason: e.to_string(),
            })?;

        let stderr = child.stderr.take().ok_or_else(|| Error::LaunchFailed {
            what: what.clone(),
            reason: "no diagnostic stream".to_string(),
        })?;
        let mut lines = BufReader::new(stderr).lines();

        let announced = tokio::time::timeout(self.config.launch_timeout, async {
            loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            if let Some(ws_url) = parse_devtools_line(&line) {
                                return Ok(ws_url.to_string());
                            }
                        }
                        Ok(None) => {
                            return Err(Error::LaunchFailed {
                                what: what.clone(),
                                reason: "diagnostic stream closed before announce".to_string(),
                            });
                        }
                        Err(e) => {
                            return Err(Error::LaunchFailed {
                                what: what.clone(),
                                reason: format!("diagnostic stream error: {e}"),
                            });
                        }
                    },
                    status = child.wait() => {
                        let status = status
                            .map(|s| s.to_string())
                            .unwrap_or_else(|e| e.to_string());
                        return Err(Error::LaunchFailed {
                            what: what.clone(),
                            reason: format!("process exited before ready ({status})"),
                        });
                    }
                }
            }
        })
        .await;

        match announced {
            Ok(Ok(ws_url)) => Ok(DebuggerEndpoint {
                ws_url,
                port: self.config.debug_port,
                target_id: None,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                // Never announced; don't leave a half-started process behind.
                let _ = child.start_kill();
                Err(Error::LaunchFailed {
                    what,
                    reason: format!(
                        "no debugger announce within {}ms",
                        self.config.launch_timeout.as_millis()
                    ),
                })
            }
        }
    }

    /// Tier: OS-protocol launch (launcher-mediated), then poll discovery.
    async fn tier_protocol_launch(&self) -> TierOutcome {
        let Some(launch_url) = &self.config.launch_url else {
            return TierOutcome::Skipped("no protocol launch URL configured".to_string());
        };

        if let Err(e) = open_protocol_url(launch_url) {
            return TierOutcome::Failed(format!("failed to open {launch_url}: {e}"));
        }

        let waiter = match self.waiter() {
            Ok(w) => w,
            Err(e) => return TierOutcome::Failed(e.to_string()),
        };
        match waiter.wait_for_endpoint().await {
            Ok(endpoint) => TierOutcome::Ready(endpoint),
            Err(e) => TierOutcome::Failed(e.to_string()),
        }
    }

    /// Tier: already-listening process; poll directly.
    async fn tier_attach(&self) -> TierOutcome {
        let waiter = match self.waiter() {
            Ok(w) => w,
            Err(e) => return TierOutcome::Failed(e.to_string()),
        };
        match waiter.wait_for_endpoint().await {
            Ok(endpoint) => TierOutcome::Ready(endpoint),
            Err(e) => TierOutcome::Failed(e.to_string()),
        }
    }

    fn profile_dir(&self) -> std::io::Result<PathBuf> {
        let dir = self.config.profile_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("tether")
                .join("browser-profile")
        });
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// First existing path of an ordered probe list.
pub fn first_existing(paths: &[PathBuf]) -> Option<PathBuf> {
    paths.iter().find(|p| p.exists()).cloned()
}

/// Resolves a browser executable: explicit override first, then the
/// platform candidate list. Bare names are resolved through `PATH`.
fn resolve_browser(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        if let Ok(found) = which::which(path) {
            return Some(found);
        }
        tracing::warn!(path = %path.display(), "browser override not found, probing defaults");
    }

    for candidate in browser_candidates() {
        let path = Path::new(&candidate);
        if path.is_absolute() {
            if path.exists() {
                return Some(path.to_path_buf());
            }
        } else if let Ok(found) = which::which(&candidate) {
            return Some(found);
        }
    }
    None
}

/// Ordered browser candidates for the current platform.
fn browser_candidates() -> Vec<String> {
    if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    } else if cfg!(target_os = "windows") {
        let mut roots = Vec::new();
        for key in ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"] {
            if let Ok(value) = std::env::var(key) {
                roots.push(PathBuf::from(value));
            }
        }
        if roots.is_empty() {
            roots.push(PathBuf::from(r"C:\Program Files"));
            roots.push(PathBuf::from(r"C:\Program Files (x86)"));
        }

        let suffixes: &[&[&str]] = &[
            &["Google", "Chrome", "Application", "chrome.exe"],
            &["Microsoft", "Edge", "Application", "msedge.exe"],
            &["Chromium", "Application", "chrome.exe"],
        ];

        let mut candidates = Vec::new();
        for root in roots {
            for suffix in suffixes {
                let mut path = root.clone();
                for component in *suffix {
                    path.push(component);
                }
                candidates.push(path.to_string_lossy().to_string());
            }
        }
        candidates.extend(["chrome.exe".to_string(), "msedge.exe".to_string()]);
        candidates
    } else {
        vec![
            "google-chrome-stable",
            "google-chrome",
            "chromium-browser",
            "chromium",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium-browser",
            "/usr/bin/chromium",
            "/snap/bin/chromium",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    }
}

/// Extracts the websocket URL from a `DevTools listening on ws://...`
/// diagnostic line.
pub fn parse_devtools_line(line: &str) -> Option<&str> {
    const MARKER: &str = "DevTools listening on ";
    let idx = line.find(MARKER)?;
    let url = line[idx + MARKER.len()..].trim();
    (url.starts_with("ws://") || url.starts_with("wss://")).then_some(url)
}

/// Spawns a process fully detached: null stdio, own process group on unix.
fn spawn_detached(mut cmd: std::process::Command) -> std::io::Result<()> {
    cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

    #[cfg(unix)]
    std::os::unix::process::CommandExt::process_group(&mut cmd, 0);

    cmd.spawn().map(drop)
}

/// Asks the OS to open a protocol URL (launcher-mediated start).
fn open_protocol_url(url: &str) -> std::io::Result<()> {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", "start", "", url]);
        c
    } else if cfg!(target_os = "macos") {
        let mut c = std::process::Command::new("open");
        c.arg(url);
        c
    } else {
        let mut c = std::process::Command::new("xdg-open");
        c.arg(url);
        c
    };

    cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
    cmd.spawn().map(drop)
}

//! Configuration surface consumed by the attach flow.
//!
//! Loading and merging policy belongs to the caller (the CLI reads one JSON
//! file); this module only defines the owned, fully-defaulted shapes that
//! the locator, session, and controller are built from.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use tether_runtime::{AttachMode, LocatorConfig, Result};

/// Fully owned attach configuration.
///
/// Every field is defaulted so a minimal file only needs to override what
/// differs from the stock setup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttachConfig {
	/// How the debuggable target is obtained.
	pub mode: AttachMode,
	/// Page URL to find among open targets (web mode).
	pub target_url: Option<String>,
	/// Explicit browser executable (web mode).
	pub browser: Option<PathBuf>,
	/// Explicit application executable (executable mode).
	pub executable: Option<PathBuf>,
	/// Default install paths probed after the override, in order.
	pub executable_candidates: Vec<PathBuf>,
	/// OS protocol URL for launcher-mediated starts.
	pub launch_url: Option<String>,
	/// Dedicated profile directory for launched browsers.
	pub profile_dir: Option<PathBuf>,
	/// Fixed remote debugging port.
	pub debug_port: u16,
	/// Discovery endpoint poll interval, milliseconds.
	pub poll_interval_ms: u64,
	/// Deadline for the discovery endpoint, milliseconds.
	pub discovery_timeout_ms: u64,
	/// Deadline for the page-target search phase, milliseconds.
	pub target_timeout_ms: u64,
	/// Deadline for a spawned executable to announce, milliseconds.
	pub launch_timeout_ms: u64,
	/// Interception and patch settings.
	pub intercept: InterceptConfig,
	/// Companion runtime bundle source.
	pub bundle: BundleConfig,
	/// Data embedded ahead of the bundle before evaluation.
	pub bootstrap: BootstrapConfig,
}

impl Default for AttachConfig {
	fn default() -> Self {
		Self {
			mode: AttachMode::Attach,
			target_url: None,
			browser: None,
			executable: None,
			executable_candidates: Vec::new(),
			launch_url: None,
			profile_dir: None,
			debug_port: 9222,
			poll_interval_ms: 250,
			discovery_timeout_ms: 30_000,
			target_timeout_ms: 20_000,
			launch_timeout_ms: 15_000,
			intercept: InterceptConfig::default(),
			bundle: BundleConfig::default(),
			bootstrap: BootstrapConfig::default(),
		}
	}
}

impl AttachConfig {
	/// Projects the locator's slice of this configuration.
	pub fn locator_config(&self) -> LocatorConfig {
		LocatorConfig {
			mode: self.mode,
			debug_port: self.debug_port,
			target_url: self.target_url.clone(),
			browser_override: self.browser.clone(),
			executable_override: self.executable.clone(),
			executable_candidates: self.executable_candidates.clone(),
			launch_url: self.launch_url.clone(),
			profile_dir: self.profile_dir.clone(),
			poll_interval: Duration::from_millis(self.poll_interval_ms),
			discovery_timeout: Duration::from_millis(self.discovery_timeout_ms),
			target_timeout: Duration::from_millis(self.target_timeout_ms),
			launch_timeout: Duration::from_millis(self.launch_timeout_ms),
		}
	}
}

/// Which responses pause, how the bootstrap is detected, and what the
/// patched alias is called. Fixed for the session lifetime.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InterceptConfig {
	/// URL-match pattern registered with the interception rule.
	pub url_pattern: String,
	/// Resource kind the rule is limited to.
	pub resource_kind: String,
	/// Pause stage; responses must pause before the target executes them.
	pub stage: String,
	/// Detection pattern applied to each intercepted body.
	pub detect_pattern: String,
	/// Well-known global property the bootstrap variable is aliased to.
	pub alias_global: String,
	/// Embedded frame checked when the global alias is absent.
	pub frame_name: Option<String>,
}

impl Default for InterceptConfig {
	fn default() -> Self {
		Self {
			url_pattern: "*.js".to_string(),
			resource_kind: "Script".to_string(),
			stage: "HeadersReceived".to_string(),
			detect_pattern: String::new(),
			alias_global: "__tether__".to_string(),
			frame_name: None,
		}
	}
}

/// Companion runtime bundle text, inline or from a file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
	/// Inline bundle source. Takes precedence over `path`.
	pub source: Option<String>,
	/// Path to the bundle file.
	pub path: Option<PathBuf>,
}

impl BundleConfig {
	/// Resolves the bundle text. An absent bundle is an empty script: the
	/// patch still installs the alias, there is just nothing else to run.
	pub fn resolve(&self) -> Result<String> {
		if let Some(source) = &self.source {
			return Ok(source.clone());
		}
		match &self.path {
			Some(path) => Ok(std::fs::read_to_string(path)?),
			None => Ok(String::new()),
		}
	}
}

/// Startup data the companion runtime reads before anything else.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
	/// Serialized startup list, passed through verbatim.
	pub startup: Vec<serde_json::Value>,
	/// Feature configuration object, passed through verbatim.
	pub features: serde_json::Value,
	/// Local administration port the companion runtime calls back on.
	pub local_port: u16,
}

impl Default for BootstrapConfig {
	fn default() -> Self {
		Self {
			startup: Vec::new(),
			features: serde_json::Value::Object(serde_json::Map::new()),
			local_port: 8077,
		}
	}
}

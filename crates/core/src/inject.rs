//! How the bootstrap is detected and what gets evaluated into the target.
//!
//! The companion bundle is evaluated directly against the target's script
//! engine rather than spliced into the intercepted body, so it survives
//! independently of that one script and is available immediately after any
//! future reload. The bootstrap data prelude must precede it textually:
//! the bundle reads the well-known global on its first statement.

use regex::Regex;

use tether_runtime::{Error, Result};

use crate::config::{BootstrapConfig, InterceptConfig};

/// Global the bootstrap data prelude is assigned to.
pub const BOOT_GLOBAL: &str = "__tether_boot__";

/// How to detect and patch the bootstrap, fixed for the session lifetime.
#[derive(Debug, Clone)]
pub struct InjectionSpec {
	/// Detection pattern applied to each intercepted body independently.
	pub detect: Regex,
	alias: String,
	frame_name: Option<String>,
	bundle: String,
	bootstrap: BootstrapConfig,
}

impl InjectionSpec {
	/// Builds the spec from configuration plus the resolved bundle text.
	pub fn from_config(
		intercept: &InterceptConfig,
		bundle: String,
		bootstrap: &BootstrapConfig,
	) -> Result<Self> {
		if intercept.detect_pattern.is_empty() {
			return Err(Error::Patch(
				"detection pattern is empty; nothing would ever match".to_string(),
			));
		}
		let detect = Regex::new(&intercept.detect_pattern)
			.map_err(|e| Error::Patch(format!("invalid detection pattern: {e}")))?;

		Ok(Self {
			detect,
			alias: intercept.alias_global.clone(),
			frame_name: intercept.frame_name.clone(),
			bundle,
			bootstrap: bootstrap.clone(),
		})
	}

	/// Well-known global property the bootstrap variable is aliased to.
	pub fn alias(&self) -> &str {
		&self.alias
	}

	/// Embedded frame consulted when the global alias is absent.
	pub fn frame_name(&self) -> Option<&str> {
		self.frame_name.as_deref()
	}

	/// The script evaluated against the target's engine on every patch
	/// cycle: bootstrap data first, then the bundle.
	pub fn runtime_script(&self) -> String {
		let boot = serde_json::json!({
			"startup": self.bootstrap.startup,
			"features": self.bootstrap.features,
			"port": self.bootstrap.local_port,
		});
		format!("var {BOOT_GLOBAL}={boot};\n{}", self.bundle)
	}
}

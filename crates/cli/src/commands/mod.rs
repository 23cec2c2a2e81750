mod attach;
mod probe;

use std::path::Path;

use tether::{AttachConfig, AttachMode};

use crate::cli::{Cli, Commands, ModeArg};
use crate::error::{CliError, Result};

pub async fn dispatch(cli: Cli) -> Result<()> {
	match cli.command {
		Commands::Attach(args) => attach::execute(args).await,
		Commands::Probe(args) => probe::execute(args).await,
	}
}

/// Loads the attach configuration from a JSON file.
///
/// `allow_missing` lets `probe` run on pure defaults; `attach` insists on a
/// file because a useful run needs at least a detection pattern.
fn load_config(path: &Path, allow_missing: bool) -> Result<AttachConfig> {
	if !path.exists() {
		if allow_missing {
			return Ok(AttachConfig::default());
		}
		return Err(CliError::ConfigMissing {
			path: path.to_path_buf(),
		});
	}

	let text = std::fs::read_to_string(path)?;
	serde_json::from_str(&text).map_err(|source| CliError::ConfigInvalid {
		path: path.to_path_buf(),
		source,
	})
}

fn apply_overrides(config: &mut AttachConfig, mode: Option<ModeArg>, port: Option<u16>) {
	if let Some(mode) = mode {
		config.mode = AttachMode::from(mode);
	}
	if let Some(port) = port {
		config.debug_port = port;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_config_defaults_only_when_allowed() {
		let path = Path::new("/definitely/missing/tether.json");
		assert!(load_config(path, true).is_ok());
		assert!(matches!(
			load_config(path, false),
			Err(CliError::ConfigMissing { .. })
		));
	}

	#[test]
	fn config_file_round_trips_and_overrides_apply() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("tether.json");
		std::fs::write(
			&path,
			r#"{"mode": "web", "target_url": "https://game.example.com/play"}"#,
		)
		.unwrap();

		let mut config = load_config(&path, false).unwrap();
		assert_eq!(config.mode, AttachMode::Web);
		assert_eq!(
			config.target_url.as_deref(),
			Some("https://game.example.com/play")
		);

		apply_overrides(&mut config, Some(crate::cli::ModeArg::Attach), Some(9501));
		assert_eq!(config.mode, AttachMode::Attach);
		assert_eq!(config.debug_port, 9501);
	}

	#[test]
	fn malformed_config_reports_the_path() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("tether.json");
		std::fs::write(&path, "{ not json").unwrap();

		let err = load_config(&path, false).unwrap_err();
		assert!(err.to_string().contains("tether.json"));
	}
}

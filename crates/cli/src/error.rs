use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("config file not found: {path}\nCreate it or pass --config; `tether probe` runs without one.")]
	ConfigMissing { path: PathBuf },

	#[error("invalid config {path}: {source}")]
	ConfigInvalid {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Tether(#[from] tether::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

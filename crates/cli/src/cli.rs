use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use tether::AttachMode;

/// Root CLI for tether.
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Attach to a browser-hosted application and graft a companion runtime into it")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Attach and keep serving interception cycles until interrupted.
	Attach(AttachArgs),
	/// Locate the target and print its debugger endpoint, then exit.
	Probe(ProbeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AttachArgs {
	/// Path to the attach configuration JSON.
	#[arg(short, long, value_name = "FILE", default_value = "tether.json")]
	pub config: PathBuf,

	/// Override the configured attach mode.
	#[arg(long, value_enum, value_name = "MODE")]
	pub mode: Option<ModeArg>,

	/// Override the configured debug port.
	#[arg(long, value_name = "PORT")]
	pub port: Option<u16>,

	/// Deadline for the first patch cycle, in seconds.
	#[arg(long, value_name = "SECS", default_value_t = 120)]
	pub patch_timeout: u64,

	/// Expression evaluated against the handle (visible as `app`) once
	/// ready; the result is printed.
	#[arg(long, value_name = "EXPR")]
	pub expr: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
	/// Path to the attach configuration JSON (defaults apply if absent).
	#[arg(short, long, value_name = "FILE", default_value = "tether.json")]
	pub config: PathBuf,

	/// Override the configured attach mode.
	#[arg(long, value_enum, value_name = "MODE")]
	pub mode: Option<ModeArg>,

	/// Override the configured debug port.
	#[arg(long, value_name = "PORT")]
	pub port: Option<u16>,
}

/// Attach mode as a CLI flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
	Web,
	Executable,
	ProtocolLaunch,
	Attach,
}

impl From<ModeArg> for AttachMode {
	fn from(mode: ModeArg) -> Self {
		match mode {
			ModeArg::Web => AttachMode::Web,
			ModeArg::Executable => AttachMode::Executable,
			ModeArg::ProtocolLaunch => AttachMode::ProtocolLaunch,
			ModeArg::Attach => AttachMode::Attach,
		}
	}
}

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

pub fn init_logging(verbosity: u8) {
	// 0 = quiet (errors only, target console suppressed)
	// 1 (-v) = info for tether, warn for the runtime plumbing
	// 2+ (-vv) = debug/trace for everything, including target console
	let filter = match verbosity {
		0 => "error",
		1 => "info,tether_runtime=warn",
		_ => "debug",
	};

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}

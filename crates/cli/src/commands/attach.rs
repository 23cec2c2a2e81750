use std::time::Duration;

use crate::cli::AttachArgs;
use crate::error::Result;

use super::{apply_overrides, load_config};

/// How long to wait, after the first patch, for the page load that makes
/// the handle resolvable.
const READY_POLL_WINDOW: Duration = Duration::from_secs(30);
const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub async fn execute(args: AttachArgs) -> Result<()> {
	let mut config = load_config(&args.config, false)?;
	apply_overrides(&mut config, args.mode, args.port);

	let mut session = tether::attach(&config).await?;
	tracing::info!("attached, waiting for the bootstrap script");

	session
		.wait_until_patched(Duration::from_secs(args.patch_timeout))
		.await?;
	println!("bootstrap patched; companion runtime is in");

	if let Some(expr) = &args.expr {
		// The handle resolves only after the patched page finishes loading.
		let deadline = tokio::time::Instant::now() + READY_POLL_WINDOW;
		while !session.ready().await && tokio::time::Instant::now() < deadline {
			tokio::time::sleep(READY_POLL_INTERVAL).await;
		}

		let value = session.evaluate_with_handle(expr).await?;
		println!("{}", serde_json::to_string_pretty(&value)?);
	}

	// Keep serving reloads until interrupted; every reload re-runs the
	// patch cycle against the fresh context.
	tracing::info!("serving reloads, press Ctrl+C to detach");
	tokio::signal::ctrl_c().await?;
	tracing::info!("detaching");
	Ok(())
}

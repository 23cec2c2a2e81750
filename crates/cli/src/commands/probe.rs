use tether_runtime::ProcessLocator;

use crate::cli::ProbeArgs;
use crate::error::Result;

use super::{apply_overrides, load_config};

pub async fn execute(args: ProbeArgs) -> Result<()> {
	let mut config = load_config(&args.config, true)?;
	apply_overrides(&mut config, args.mode, args.port);

	let locator = ProcessLocator::new(config.locator_config());
	let endpoint = locator.locate().await?;

	println!(
		"{}",
		serde_json::json!({
			"webSocketDebuggerUrl": endpoint.ws_url,
			"port": endpoint.port,
			"targetId": endpoint.target_id,
		})
	);
	Ok(())
}

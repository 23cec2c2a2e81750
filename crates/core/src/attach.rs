//! The attach flow: locator → waiter → session init → event pump.
//!
//! Exactly one logical session per run. The session context built here is
//! passed by reference through every layer - there are no module-level
//! globals - and after establishment there is one writer (this flow) while
//! every other holder only issues commands, so no locking is needed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use tether_protocol::Event;
use tether_runtime::{Connection, Error, ProcessLocator, Result, transport};

use crate::config::AttachConfig;
use crate::handle::ContextHandle;
use crate::inject::InjectionSpec;
use crate::intercept::{InterceptOps, InterceptionController};
use crate::session::{InterceptionRule, Session};

/// A live, initialized session with the interception pump running.
///
/// This is the surface external collaborators consume: an
/// evaluate-against-the-handle capability and a readiness signal.
pub struct AttachedSession {
	session: Arc<Session>,
	handle: ContextHandle,
	ready_rx: watch::Receiver<bool>,
	pump: JoinHandle<()>,
}

impl AttachedSession {
	/// The shared protocol session.
	pub fn session(&self) -> &Arc<Session> {
		&self.session
	}

	/// The lazily resolved context handle.
	pub fn handle(&self) -> &ContextHandle {
		&self.handle
	}

	/// True once at least one patch cycle has completed successfully.
	pub fn patched(&self) -> bool {
		*self.ready_rx.borrow()
	}

	/// Waits for the first successful patch cycle.
	pub async fn wait_until_patched(&mut self, timeout: Duration) -> Result<()> {
		let waited = tokio::time::timeout(timeout, self.ready_rx.wait_for(|patched| *patched));
		match waited.await {
			Ok(Ok(_)) => Ok(()),
			Ok(Err(_)) => Err(Error::ChannelClosed),
			Err(_) => Err(Error::Timeout(format!(
				"no patch cycle completed within {}ms",
				timeout.as_millis()
			))),
		}
	}

	/// Readiness as consumers see it: a patch cycle has completed and the
	/// handle currently resolves non-empty.
	pub async fn ready(&self) -> bool {
		self.patched() && self.handle.is_ready(self.session.as_ref()).await
	}

	/// Evaluates `expr` against the resolved root object (visible as
	/// `app`). Absence comes back as the null sentinel, evaluation errors
	/// go to the caller untouched; neither disturbs the session.
	pub async fn evaluate_with_handle(&self, expr: &str) -> Result<serde_json::Value> {
		self.session.evaluate_expression(&self.handle.wrap(expr)).await
	}
}

impl Drop for AttachedSession {
	fn drop(&mut self) {
		self.pump.abort();
	}
}

/// Locates the target, connects, initializes the session, and starts the
/// interception pump.
pub async fn attach(config: &AttachConfig) -> Result<AttachedSession> {
	let bundle = config.bundle.resolve()?;
	let spec = InjectionSpec::from_config(&config.intercept, bundle, &config.bootstrap)?;

	let locator = ProcessLocator::new(config.locator_config());
	let endpoint = locator.locate().await?;
	tracing::info!(url = %endpoint.ws_url, "attaching");

	let parts = transport::connect(&endpoint.ws_url).await?;
	let (connection, events) = Connection::start(parts);
	let session = Arc::new(Session::new(connection));

	let rule = InterceptionRule {
		url_pattern: config.intercept.url_pattern.clone(),
		resource_kind: config.intercept.resource_kind.clone(),
		stage: config.intercept.stage.clone(),
	};
	session.initialize(&rule).await?;

	let handle = ContextHandle::new(
		config.intercept.alias_global.clone(),
		config.intercept.frame_name.clone(),
	);

	let (ready_tx, ready_rx) = watch::channel(false);
	let controller = InterceptionController::new(Arc::clone(&session), spec, ready_tx);
	let pump = tokio::spawn(pump_events(events, controller));

	Ok(AttachedSession {
		session,
		handle,
		ready_rx,
		pump,
	})
}

/// The single consuming task: one interception cycle at a time, to
/// completion, before the next event is taken. Page-load and console
/// events are logged and everything else ignored.
async fn pump_events<O: InterceptOps + 'static>(
	mut events: mpsc::UnboundedReceiver<Event>,
	mut controller: InterceptionController<O>,
) {
	while let Some(event) = events.recv().await {
		match event.method.as_str() {
			"Network.requestIntercepted" => {
				let outcome = controller.on_intercepted(&event.params).await;
				tracing::trace!(?outcome, "interception cycle finished");
			}
			"Page.loadEventFired" => {
				// Each load recreates the target context; the handle is
				// resolved lazily so there is nothing to invalidate here.
				tracing::debug!("page load fired");
			}
			"Runtime.consoleAPICalled" | "Log.entryAdded" => log_target_console(&event),
			_ => tracing::trace!(method = %event.method, "ignoring event"),
		}
	}
	tracing::debug!("event stream ended, pump stopping");
}

/// Re-emits target console/log traffic on our own logs.
fn log_target_console(event: &Event) {
	let text = match event.method.as_str() {
		"Runtime.consoleAPICalled" => {
			let args = event.params.get("args").and_then(|a| a.as_array());
			args.map(|args| {
				args.iter()
					.map(|arg| {
						arg.get("value")
							.map(|v| v.to_string())
							.or_else(|| {
								arg.get("description").map(|d| d.to_string())
							})
							.unwrap_or_else(|| "<object>".to_string())
					})
					.collect::<Vec<_>>()
					.join(" ")
			})
			.unwrap_or_default()
		}
		_ => event
			.params
			.pointer("/entry/text")
			.and_then(|t| t.as_str())
			.unwrap_or_default()
			.to_string(),
	};
	tracing::debug!(target: "tether::console", "{text}");
}

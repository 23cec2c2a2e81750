//! The patch state machine, invoked once per intercepted response.
//!
//! Cycles run strictly one at a time: the event pump awaits each cycle to
//! completion (through resume) before taking the next event, so synthesized
//! responses can never interleave. A failure inside one cycle falls back to
//! releasing the original body - the application still loads, degraded,
//! rather than hanging - and never tears down the session.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use serde_json::Value;
use tokio::sync::watch;

use tether_runtime::{Error, Result};

use crate::inject::InjectionSpec;
use crate::patch::{PatchOutcome, assemble_response, patch_body};

/// What the controller needs from the session. Split out so the state
/// machine is testable against a recording fake.
#[async_trait]
pub trait InterceptOps: Send + Sync {
	/// Fetches the complete paused response body; the flag says whether it
	/// is base64-coded.
	async fn fetch_body(&self, interception_id: &str) -> Result<(String, bool)>;
	/// Resumes the paused exchange with the original body.
	async fn resume(&self, interception_id: &str) -> Result<()>;
	/// Resumes the paused exchange with a base64 raw HTTP replacement.
	async fn fulfill(&self, interception_id: &str, raw_response: &str) -> Result<()>;
	/// Evaluates a script against the target's engine.
	async fn evaluate(&self, expression: &str) -> Result<Value>;
}

/// Where the current cycle stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
	Idle,
	Intercepted,
	Patched,
	Failed,
	Released,
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
	/// Bootstrap found; the patched replacement was delivered.
	Patched,
	/// No match; the original body was released unmodified.
	PassedThrough,
	/// The cycle failed mid-way but the original body was still released.
	Recovered,
	/// The exchange could not be resumed at all. Unrecoverable for this one
	/// request; the session stays up.
	ResumeFailed,
}

/// The patch state machine.
///
/// Re-applies the same patch on every reload by design: reloads destroy and
/// recreate the target context, so each pass through the bootstrap script
/// must be patched again.
pub struct InterceptionController<O: InterceptOps> {
	ops: Arc<O>,
	spec: InjectionSpec,
	ready_tx: watch::Sender<bool>,
	state: CycleState,
	patched_once: bool,
}

impl<O: InterceptOps> InterceptionController<O> {
	pub fn new(ops: Arc<O>, spec: InjectionSpec, ready_tx: watch::Sender<bool>) -> Self {
		Self {
			ops,
			spec,
			ready_tx,
			state: CycleState::Idle,
			patched_once: false,
		}
	}

	pub fn state(&self) -> CycleState {
		self.state
	}

	/// Runs one full patch cycle for an intercepted-response event.
	pub async fn on_intercepted(&mut self, params: &Value) -> CycleOutcome {
		let Some(id) = params.get("interceptionId").and_then(|v| v.as_str()) else {
			tracing::error!("intercepted event without interceptionId, nothing to resume");
			return CycleOutcome::ResumeFailed;
		};
		self.state = CycleState::Intercepted;
		let url = params
			.pointer("/request/url")
			.and_then(|u| u.as_str())
			.unwrap_or("<unknown>");
		tracing::debug!(url, id, "response paused");

		match self.try_patch(id, content_type_of(params)).await {
			Ok(Some(raw_response)) => {
				self.state = CycleState::Patched;
				match self.ops.fulfill(id, &raw_response).await {
					Ok(()) => {
						self.state = CycleState::Released;
						if !self.patched_once {
							self.patched_once = true;
							tracing::info!(url, "bootstrap patched, handle seeded");
						}
						let _ = self.ready_tx.send(true);
						CycleOutcome::Patched
					}
					Err(e) => {
						tracing::error!(error = %e, id, "failed to deliver patched response, request lost");
						CycleOutcome::ResumeFailed
					}
				}
			}
			Ok(None) => match self.ops.resume(id).await {
				Ok(()) => {
					self.state = CycleState::Released;
					tracing::debug!(url, "no bootstrap in body, released unmodified");
					CycleOutcome::PassedThrough
				}
				Err(e) => {
					tracing::error!(error = %e, id, "failed to resume exchange, request lost");
					CycleOutcome::ResumeFailed
				}
			},
			Err(e) => {
				self.state = CycleState::Failed;
				tracing::warn!(error = %e, url, "patch cycle failed, releasing original body");
				match self.ops.resume(id).await {
					Ok(()) => {
						self.state = CycleState::Released;
						CycleOutcome::Recovered
					}
					Err(e) => {
						tracing::error!(error = %e, id, "failed to resume exchange, request lost");
						CycleOutcome::ResumeFailed
					}
				}
			}
		}
	}

	/// Steps 1-5: fetch, decode, detect, inject, reassemble. `Ok(None)`
	/// means "no match, release as-is"; any `Err` is recovered by the
	/// caller.
	async fn try_patch(&self, id: &str, content_type: &str) -> Result<Option<String>> {
		let (raw, base64_encoded) = self.ops.fetch_body(id).await?;
		let body = if base64_encoded {
			let bytes = B64
				.decode(raw.as_bytes())
				.map_err(|e| Error::Patch(format!("body base64 decode: {e}")))?;
			String::from_utf8(bytes).map_err(|e| Error::Patch(format!("body not utf-8: {e}")))?
		} else {
			raw
		};

		match patch_body(&body, &self.spec.detect, self.spec.alias()) {
			PatchOutcome::NoMatch => Ok(None),
			PatchOutcome::Patched { body: patched, ident } => {
				tracing::info!(ident = %ident, "bootstrap assignment detected");
				// The companion runtime goes in through the engine, not the
				// intercepted body, so it survives independently of this one
				// script across reloads.
				self.ops.evaluate(&self.spec.runtime_script()).await?;
				let response = assemble_response(&patched, content_type);
				Ok(Some(B64.encode(response.as_bytes())))
			}
		}
	}
}

/// Content type of the paused response, defaulting to script.
fn content_type_of(params: &Value) -> &str {
	let headers = params.get("responseHeaders");
	for key in ["Content-Type", "content-type"] {
		if let Some(ct) = headers.and_then(|h| h.get(key)).and_then(|v| v.as_str()) {
			return ct;
		}
	}
	"application/javascript"
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use crate::config::{BootstrapConfig, InterceptConfig};
	use crate::testing::FakeOps;

	use super::*;

	const BOOTSTRAP_BODY: &str = "X.ApplicationMain = function(){ /*...*/ };";

	fn spec() -> InjectionSpec {
		let intercept = InterceptConfig {
			detect_pattern: r"\w+\.ApplicationMain\s*=".to_string(),
			alias_global: "__handle__".to_string(),
			..InterceptConfig::default()
		};
		InjectionSpec::from_config(
			&intercept,
			"(function(){ /* companion */ })();".to_string(),
			&BootstrapConfig::default(),
		)
		.unwrap()
	}

	fn controller(
		ops: Arc<FakeOps>,
	) -> (InterceptionController<FakeOps>, watch::Receiver<bool>) {
		let (ready_tx, ready_rx) = watch::channel(false);
		(InterceptionController::new(ops, spec(), ready_tx), ready_rx)
	}

	fn event(id: &str) -> Value {
		json!({
			"interceptionId": id,
			"request": {"url": "https://game.example.com/js/bootstrap.js"},
			"responseHeaders": {"Content-Type": "text/javascript"},
			"responseStatusCode": 200
		})
	}

	fn decode_fulfill(call: &str) -> String {
		let payload = call.splitn(3, ':').nth(2).unwrap();
		String::from_utf8(B64.decode(payload.as_bytes()).unwrap()).unwrap()
	}

	#[tokio::test]
	async fn matching_body_is_patched_and_fulfilled() {
		let ops = Arc::new(FakeOps::with_body(BOOTSTRAP_BODY));
		let (mut controller, ready_rx) = controller(Arc::clone(&ops));

		let outcome = controller.on_intercepted(&event("job-1")).await;
		assert_eq!(outcome, CycleOutcome::Patched);
		assert_eq!(controller.state(), CycleState::Released);
		assert!(*ready_rx.borrow(), "readiness must flip on first patch");

		let calls = ops.calls();
		assert_eq!(calls.len(), 3);
		assert_eq!(calls[0], "fetch:job-1");
		assert!(calls[1].starts_with("eval:var __tether_boot__="), "{}", calls[1]);
		assert!(calls[1].contains("/* companion */"));
		assert!(calls[2].starts_with("fulfill:job-1:"));

		let response = decode_fulfill(&calls[2]);
		assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
		assert!(response.contains("\r\nContent-Type: text/javascript\r\n"));
		let (head, body) = response.split_once("\r\n\r\n").unwrap();
		assert!(body.contains("window.__handle__=X;"));
		let declared: usize = head
			.lines()
			.find_map(|l| l.strip_prefix("Content-Length: "))
			.unwrap()
			.parse()
			.unwrap();
		assert_eq!(declared, body.len());
	}

	#[tokio::test]
	async fn non_matching_body_passes_through_unmodified() {
		let ops = Arc::new(FakeOps::with_body("var analytics = {};"));
		let (mut controller, ready_rx) = controller(Arc::clone(&ops));

		let outcome = controller.on_intercepted(&event("job-2")).await;
		assert_eq!(outcome, CycleOutcome::PassedThrough);
		assert_eq!(controller.state(), CycleState::Released);
		assert!(!*ready_rx.borrow());
		assert_eq!(ops.calls(), vec!["fetch:job-2", "resume:job-2"]);
	}

	#[tokio::test]
	async fn base64_coded_bodies_are_decoded_first() {
		let ops = Arc::new(FakeOps::with_base64_body(BOOTSTRAP_BODY));
		let (mut controller, _ready_rx) = controller(Arc::clone(&ops));

		let outcome = controller.on_intercepted(&event("job-3")).await;
		assert_eq!(outcome, CycleOutcome::Patched);
	}

	#[tokio::test]
	async fn body_fetch_failure_recovers_to_original() {
		let ops = Arc::new(FakeOps::with_body(BOOTSTRAP_BODY));
		ops.fail_fetch.store(true, std::sync::atomic::Ordering::SeqCst);
		let (mut controller, ready_rx) = controller(Arc::clone(&ops));

		let outcome = controller.on_intercepted(&event("job-4")).await;
		assert_eq!(outcome, CycleOutcome::Recovered);
		assert_eq!(controller.state(), CycleState::Released);
		assert!(!*ready_rx.borrow());
		assert_eq!(ops.calls(), vec!["fetch:job-4", "resume:job-4"]);
	}

	#[tokio::test]
	async fn bundle_evaluation_failure_recovers_to_original() {
		let ops = Arc::new(FakeOps::with_body(BOOTSTRAP_BODY));
		ops.fail_eval.store(true, std::sync::atomic::Ordering::SeqCst);
		let (mut controller, ready_rx) = controller(Arc::clone(&ops));

		let outcome = controller.on_intercepted(&event("job-5")).await;
		assert_eq!(outcome, CycleOutcome::Recovered);
		assert!(!*ready_rx.borrow());

		let calls = ops.calls();
		assert_eq!(calls.len(), 3);
		assert_eq!(calls[2], "resume:job-5", "must fall back to plain resume");
	}

	#[tokio::test]
	async fn fulfill_failure_is_unrecoverable_but_contained() {
		let ops = Arc::new(FakeOps::with_body(BOOTSTRAP_BODY));
		ops.fail_fulfill.store(true, std::sync::atomic::Ordering::SeqCst);
		let (mut controller, ready_rx) = controller(Arc::clone(&ops));

		let outcome = controller.on_intercepted(&event("job-6")).await;
		assert_eq!(outcome, CycleOutcome::ResumeFailed);
		assert!(!*ready_rx.borrow());

		// No retry after a failed delivery; the request is lost, not the
		// session.
		let calls = ops.calls();
		assert!(calls.last().unwrap().starts_with("fulfill:job-6:"));
	}

	#[tokio::test]
	async fn resume_failure_during_recovery_is_contained() {
		let ops = Arc::new(FakeOps::with_body(BOOTSTRAP_BODY));
		ops.fail_fetch.store(true, std::sync::atomic::Ordering::SeqCst);
		ops.fail_resume.store(true, std::sync::atomic::Ordering::SeqCst);
		let (mut controller, _ready_rx) = controller(Arc::clone(&ops));

		let outcome = controller.on_intercepted(&event("job-7")).await;
		assert_eq!(outcome, CycleOutcome::ResumeFailed);
	}

	#[tokio::test]
	async fn reload_cycles_patch_again_without_duplicating() {
		let ops = Arc::new(FakeOps::with_body(BOOTSTRAP_BODY));
		let (mut controller, _ready_rx) = controller(Arc::clone(&ops));

		assert_eq!(controller.on_intercepted(&event("load-1")).await, CycleOutcome::Patched);
		assert_eq!(controller.on_intercepted(&event("load-2")).await, CycleOutcome::Patched);

		let calls = ops.calls();
		let second = decode_fulfill(&calls[5]);
		let (_, body) = second.split_once("\r\n\r\n").unwrap();
		assert_eq!(body.matches("window.__handle__=X;").count(), 1);
	}

	#[tokio::test]
	async fn event_without_interception_id_is_rejected_quietly() {
		let ops = Arc::new(FakeOps::with_body(BOOTSTRAP_BODY));
		let (mut controller, _ready_rx) = controller(Arc::clone(&ops));

		let outcome = controller.on_intercepted(&json!({"request": {}})).await;
		assert_eq!(outcome, CycleOutcome::ResumeFailed);
		assert!(ops.calls().is_empty());
	}

	#[test]
	fn content_type_falls_back_to_script() {
		assert_eq!(content_type_of(&json!({})), "application/javascript");
		assert_eq!(
			content_type_of(&json!({"responseHeaders": {"content-type": "text/html"}})),
			"text/html"
		);
	}
}

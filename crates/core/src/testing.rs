//! Recording fake of the session seam, shared across unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use tether_runtime::{Error, Result};

use crate::intercept::InterceptOps;

/// Records every call and can be told to fail any single operation.
pub(crate) struct FakeOps {
	pub body: Mutex<(String, bool)>,
	pub eval_result: Mutex<Value>,
	pub fail_fetch: AtomicBool,
	pub fail_eval: AtomicBool,
	pub fail_fulfill: AtomicBool,
	pub fail_resume: AtomicBool,
	pub calls: Mutex<Vec<String>>,
}

impl FakeOps {
	pub fn with_body(body: &str) -> Self {
		Self {
			body: Mutex::new((body.to_string(), false)),
			eval_result: Mutex::new(Value::Null),
			fail_fetch: AtomicBool::new(false),
			fail_eval: AtomicBool::new(false),
			fail_fulfill: AtomicBool::new(false),
			fail_resume: AtomicBool::new(false),
			calls: Mutex::new(Vec::new()),
		}
	}

	pub fn with_base64_body(body: &str) -> Self {
		use base64::Engine as _;
		use base64::engine::general_purpose::STANDARD;
		let fake = Self::with_body("");
		*fake.body.lock().unwrap() = (STANDARD.encode(body.as_bytes()), true);
		fake
	}

	pub fn calls(&self) -> Vec<String> {
		self.calls.lock().unwrap().clone()
	}

	fn record(&self, call: String) {
		self.calls.lock().unwrap().push(call);
	}
}

#[async_trait]
impl InterceptOps for FakeOps {
	async fn fetch_body(&self, interception_id: &str) -> Result<(String, bool)> {
		self.record(format!("fetch:{interception_id}"));
		// One-shot: fails the next fetch only, so multi-event tests stay
		// deterministic regardless of pump timing.
		if self.fail_fetch.swap(false, Ordering::SeqCst) {
			return Err(Error::Cdp {
				method: "Network.getResponseBodyForInterception".to_string(),
				code: -32000,
				message: "No resource with given identifier".to_string(),
			});
		}
		Ok(self.body.lock().unwrap().clone())
	}

	async fn resume(&self, interception_id: &str) -> Result<()> {
		self.record(format!("resume:{interception_id}"));
		if self.fail_resume.load(Ordering::SeqCst) {
			return Err(Error::ChannelClosed);
		}
		Ok(())
	}

	async fn fulfill(&self, interception_id: &str, raw_response: &str) -> Result<()> {
		self.record(format!("fulfill:{interception_id}:{raw_response}"));
		if self.fail_fulfill.load(Ordering::SeqCst) {
			return Err(Error::ChannelClosed);
		}
		Ok(())
	}

	async fn evaluate(&self, expression: &str) -> Result<Value> {
		self.record(format!("eval:{expression}"));
		if self.fail_eval.load(Ordering::SeqCst) {
			return Err(Error::Evaluation("Uncaught SyntaxError".to_string()));
		}
		Ok(self.eval_result.lock().unwrap().clone())
	}
}

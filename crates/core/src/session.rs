//! The one protocol session against the attached target.
//!
//! Owns the connection and exposes the domain-scoped commands the rest of
//! the crate needs. Shared by `Arc` after establishment: the attach flow is
//! the single writer during initialization, every other holder only issues
//! commands.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use tether_runtime::{Connection, Error, Result};

use crate::intercept::InterceptOps;

/// Which responses to pause. Fixed for the session lifetime, and registered
/// before the network domain is enabled.
#[derive(Debug, Clone)]
pub struct InterceptionRule {
	/// URL-match pattern (`*` wildcards, as the wire protocol consumes).
	pub url_pattern: String,
	/// Resource kind the rule is limited to (e.g. `"Script"`).
	pub resource_kind: String,
	/// Pause stage; `"HeadersReceived"` pauses before the target can
	/// execute the response.
	pub stage: String,
}

impl InterceptionRule {
	/// Parameter object for `Network.setRequestInterception`.
	pub fn to_params(&self) -> Value {
		json!({
			"patterns": [{
				"urlPattern": self.url_pattern,
				"resourceType": self.resource_kind,
				"interceptionStage": self.stage,
			}]
		})
	}
}

/// The single active session against the target.
pub struct Session {
	connection: Arc<Connection>,
}

impl Session {
	pub fn new(connection: Arc<Connection>) -> Self {
		Self { connection }
	}

	/// Brings the session to the state where interception delivery is
	/// guaranteed.
	///
	/// Order is contractual: the interception rule must be registered and
	/// caching/CSP handled before the network domain starts delivering,
	/// otherwise the first load can slip through unpaused. The four domain
	/// enables at the end carry no such ordering and run concurrently, but
	/// all of them must complete before interception is relied on.
	pub async fn initialize(&self, rule: &InterceptionRule) -> Result<()> {
		self.connection
			.command("Network.setRequestInterception", rule.to_params())
			.await?;
		self.connection
			.command("Network.setCacheDisabled", json!({"cacheDisabled": true}))
			.await?;
		self.connection
			.command("Page.setBypassCSP", json!({"enabled": true}))
			.await?;
		self.connection.command("Log.enable", json!({})).await?;

		tokio::try_join!(
			self.connection.command("Network.enable", json!({})),
			self.connection.command("Page.enable", json!({})),
			self.connection.command("Runtime.enable", json!({})),
			self.connection.command("DOM.enable", json!({})),
		)?;

		tracing::debug!(pattern = %rule.url_pattern, "session initialized, interception active");
		Ok(())
	}

	/// Sends a raw domain command.
	pub async fn command(&self, method: &str, params: Value) -> Result<Value> {
		self.connection.command(method, params).await
	}

	/// Evaluates a script expression in the target.
	///
	/// Exceptions thrown by the expression come back as
	/// [`Error::Evaluation`]; they are returned to the caller and never
	/// retried.
	pub async fn evaluate_expression(&self, expression: &str) -> Result<Value> {
		let result = self
			.connection
			.command(
				"Runtime.evaluate",
				json!({
					"expression": expression,
					"returnByValue": true,
					"awaitPromise": true,
				}),
			)
			.await?;

		if let Some(exception) = result.get("exceptionDetails") {
			let message = exception
				.get("exception")
				.and_then(|e| e.get("description"))
				.and_then(|d| d.as_str())
				.or_else(|| exception.get("text").and_then(|t| t.as_str()))
				.unwrap_or("unknown exception");
			return Err(Error::Evaluation(message.to_string()));
		}

		Ok(result
			.get("result")
			.and_then(|r| r.get("value"))
			.cloned()
			.unwrap_or(Value::Null))
	}
}

#[async_trait]
impl InterceptOps for Session {
	async fn fetch_body(&self, interception_id: &str) -> Result<(String, bool)> {
		let result = self
			.connection
			.command(
				"Network.getResponseBodyForInterception",
				json!({"interceptionId": interception_id}),
			)
			.await?;

		let body = result
			.get("body")
			.and_then(|b| b.as_str())
			.ok_or_else(|| Error::Protocol("interception body missing".to_string()))?
			.to_string();
		let base64_encoded = result
			.get("base64Encoded")
			.and_then(|b| b.as_bool())
			.unwrap_or(false);
		Ok((body, base64_encoded))
	}

	async fn resume(&self, interception_id: &str) -> Result<()> {
		self.connection
			.command(
				"Network.continueInterceptedRequest",
				json!({"interceptionId": interception_id}),
			)
			.await?;
		Ok(())
	}

	async fn fulfill(&self, interception_id: &str, raw_response: &str) -> Result<()> {
		self.connection
			.command(
				"Network.continueInterceptedRequest",
				json!({
					"interceptionId": interception_id,
					"rawResponse": raw_response,
				}),
			)
			.await?;
		Ok(())
	}

	async fn evaluate(&self, expression: &str) -> Result<Value> {
		self.evaluate_expression(expression).await
	}
}

#[cfg(test)]
mod tests {
	use tokio::sync::mpsc;

	use tether_runtime::TransportParts;

	use super::*;

	#[test]
	fn rule_params_follow_the_wire_shape() {
		let rule = InterceptionRule {
			url_pattern: "*bootstrap*.js".to_string(),
			resource_kind: "Script".to_string(),
			stage: "HeadersReceived".to_string(),
		};
		let params = rule.to_params();
		let pattern = &params["patterns"][0];
		assert_eq!(pattern["urlPattern"], "*bootstrap*.js");
		assert_eq!(pattern["resourceType"], "Script");
		assert_eq!(pattern["interceptionStage"], "HeadersReceived");
	}

	/// Fake target: answers every command with an empty result and records
	/// the method order.
	fn scripted_session() -> (Session, tokio::task::JoinHandle<Vec<String>>) {
		let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (connection, _events) = Connection::start(TransportParts {
			outbound_tx,
			inbound_rx,
		});

		let responder = tokio::spawn(async move {
			let mut methods = Vec::new();
			while let Some(frame) = outbound_rx.recv().await {
				methods.push(frame["method"].as_str().unwrap_or("").to_string());
				let reply = json!({"id": frame["id"], "result": {}});
				if inbound_tx.send(reply).is_err() {
					break;
				}
				if methods.len() == 8 {
					break;
				}
			}
			methods
		});

		(Session::new(connection), responder)
	}

	#[tokio::test]
	async fn initialization_order_is_preserved() {
		let (session, responder) = scripted_session();
		let rule = InterceptionRule {
			url_pattern: "*.js".to_string(),
			resource_kind: "Script".to_string(),
			stage: "HeadersReceived".to_string(),
		};

		session.initialize(&rule).await.unwrap();
		let methods = responder.await.unwrap();

		// The rule lands before anything else, and strictly before the
		// network domain is enabled.
		assert_eq!(methods[0], "Network.setRequestInterception");
		assert_eq!(methods[1], "Network.setCacheDisabled");
		assert_eq!(methods[2], "Page.setBypassCSP");
		assert_eq!(methods[3], "Log.enable");

		let enables: Vec<_> = methods[4..].iter().map(String::as_str).collect();
		for domain in ["Network.enable", "Page.enable", "Runtime.enable", "DOM.enable"] {
			assert!(enables.contains(&domain), "missing {domain} in {enables:?}");
		}
	}

	#[tokio::test]
	async fn evaluation_exceptions_surface_as_errors() {
		let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (connection, _events) = Connection::start(TransportParts {
			outbound_tx,
			inbound_rx,
		});
		let session = Session::new(connection);

		let responder = tokio::spawn(async move {
			let frame = outbound_rx.recv().await.unwrap();
			let reply = json!({
				"id": frame["id"],
				"result": {
					"result": {"type": "object", "subtype": "error"},
					"exceptionDetails": {
						"text": "Uncaught",
						"exception": {"description": "ReferenceError: app is not defined"}
					}
				}
			});
			let _ = inbound_tx.send(reply);
		});

		let err = session.evaluate_expression("app.frobnicate()").await.unwrap_err();
		responder.await.unwrap();
		match err {
			Error::Evaluation(message) => {
				assert!(message.contains("ReferenceError"), "{message}");
			}
			other => panic!("expected Evaluation error, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn evaluation_unwraps_returned_value() {
		let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (connection, _events) = Connection::start(TransportParts {
			outbound_tx,
			inbound_rx,
		});
		let session = Session::new(connection);

		let responder = tokio::spawn(async move {
			let frame = outbound_rx.recv().await.unwrap();
			assert_eq!(frame["method"], "Runtime.evaluate");
			assert_eq!(frame["params"]["returnByValue"], true);
			let reply = json!({
				"id": frame["id"],
				"result": {"result": {"type": "number", "value": 17}}
			});
			let _ = inbound_tx.send(reply);
		});

		let value = session.evaluate_expression("app.level").await.unwrap();
		responder.await.unwrap();
		assert_eq!(value, json!(17));
	}
}

//! Envelope types for DevTools JSON-RPC traffic.
//!
//! Every frame on the websocket is one of two shapes: a response to a
//! previously sent command (has an `id`) or an event pushed by the target
//! (has a `method` but no `id`). The untagged [`Message`] enum mirrors that
//! distinction, with an `Unknown` arm so unrecognized frames are skipped
//! rather than killing the read loop.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A command sent to the debugging target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// Auto-incrementing command ID used to correlate the response.
    pub id: u64,
    /// Domain-qualified method name (e.g. `"Network.enable"`).
    pub method: String,
    /// Method parameters as a JSON object.
    pub params: Value,
}

/// A response to a previously sent [`Command`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// ID of the command this response correlates to.
    pub id: u64,
    /// Success result (mutually exclusive with `error`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error result (mutually exclusive with `result`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

/// Error object carried in a failed [`Response`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Optional extra detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// An event pushed by the target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Domain-qualified event name (e.g. `"Network.requestIntercepted"`).
    pub method: String,
    /// Event parameters as a JSON object.
    #[serde(default)]
    pub params: Value,
}

/// Discriminated union of inbound protocol frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    /// Response frame (has `id`).
    Response(Response),
    /// Event frame (has `method`, no `id`).
    Event(Event),
    /// Unrecognized frame (forward-compatible catch-all).
    Unknown(Value),
}

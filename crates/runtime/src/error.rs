//! Error types for the tether runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while locating, launching, or talking to a target.
#[derive(Debug, Error)]
pub enum Error {
    /// Every locate tier was exhausted without producing an endpoint.
    /// The message carries a per-tier outcome report and a domain hint.
    #[error("no debuggable target found\n{0}")]
    TargetNotFound(String),

    /// A child process could not be spawned or died before becoming ready.
    #[error("failed to launch {what}: {reason}")]
    LaunchFailed { what: String, reason: String },

    /// The discovery endpoint never returned a usable websocket URL in time.
    #[error("discovery timed out after {elapsed_ms}ms polling {endpoint}")]
    DiscoveryTimeout { endpoint: String, elapsed_ms: u64 },

    /// No open page target matched the configured URL in time.
    #[error("no page target matching '{wanted}' appeared within {elapsed_ms}ms")]
    TargetSearchTimeout { wanted: String, elapsed_ms: u64 },

    /// Failed to establish the websocket connection.
    #[error("failed to connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Transport-level error (websocket I/O).
    #[error("transport error: {0}")]
    Transport(String),

    /// Protocol-level error (malformed or unexpected frames).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The target rejected a command.
    #[error("{method} failed: {message} (code {code})")]
    Cdp {
        method: String,
        code: i64,
        message: String,
    },

    /// No response to a command within the deadline.
    #[error("timed out after {timeout_ms}ms waiting for response to {method}")]
    CommandTimeout { method: String, timeout_ms: u64 },

    /// The connection closed while a command was outstanding.
    #[error("connection closed")]
    ChannelClosed,

    /// Script evaluation threw in the target.
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// A patch cycle step failed (body decode, re-encode).
    #[error("patch failed: {0}")]
    Patch(String),

    /// Generic deadline expiry.
    #[error("timeout: {0}")]
    Timeout(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if this error is any of the deadline-expiry variants.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::DiscoveryTimeout { .. }
                | Error::TargetSearchTimeout { .. }
                | Error::CommandTimeout { .. }
                | Error::Timeout(_)
        )
    }

    /// Returns true if the connection to the target is gone.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::ChannelClosed)
    }
}

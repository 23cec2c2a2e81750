//! Command/event correlation layer on top of the transport.
//!
//! This module implements the request/response correlation for the DevTools
//! connection. It handles:
//! - Generating unique command IDs
//! - Correlating responses with pending commands
//! - Distinguishing events from responses
//! - Forwarding events to the single consuming task
//!
//! # Message Flow
//!
//! 1. Caller invokes `command()` with method and params
//! 2. Connection generates a unique ID and registers a oneshot channel
//! 3. The command is serialized and queued on the transport
//! 4. Caller awaits on the oneshot receiver (bounded by a timeout)
//! 5. The dispatch task receives the response frame from the transport
//! 6. The response is correlated by ID and delivered through the oneshot
//!
//! Events carry no ID and are pushed to the receiver returned by
//! [`Connection::start`]. There is exactly one event consumer by design:
//! interception cycles must run to completion one at a time, and a single
//! consuming task enforces that without reentrancy.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use tether_protocol::{Command, Event, Message};

use crate::error::{Error, Result};
use crate::transport::TransportParts;

/// Default deadline for a single command round-trip.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

type PendingMap = Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>;

/// Removes the pending entry if the command future is dropped or times out
/// before a response arrives.
struct CancelGuard<'a> {
    id: u64,
    pending: &'a PendingMap,
    completed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if !self.completed && self.pending.lock().remove(&self.id).is_some() {
            tracing::debug!(id = self.id, "removed orphaned command callback");
        }
    }
}

/// The one active DevTools connection.
///
/// Commands are sent with auto-incrementing IDs and responses are correlated
/// back to the caller. Shared by `Arc`: the attach flow is the single writer,
/// every other holder only issues commands.
pub struct Connection {
    next_id: AtomicU64,
    pending: Arc<PendingMap>,
    outbound_tx: mpsc::UnboundedSender<Value>,
}

impl Connection {
    /// Wraps transport parts and spawns the dispatch task.
    ///
    /// Returns the shared connection and the event stream. The stream ends
    /// when the transport closes; pending commands are failed with
    /// [`Error::ChannelClosed`] at that point.
    pub fn start(parts: TransportParts) -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        let TransportParts {
            outbound_tx,
            mut inbound_rx,
        } = parts;

        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let connection = Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending: Arc::clone(&pending),
            outbound_tx,
        });

        tokio::spawn(async move {
            while let Some(frame) = inbound_rx.recv().await {
                match serde_json::from_value::<Message>(frame) {
                    Ok(Message::Response(response)) => {
                        let callback = pending.lock().remove(&response.id);
                        match callback {
                            Some(tx) => {
                                let result = match response.error {
                                    Some(err) => Err(Error::Cdp {
                                        method: String::new(),
                                        code: err.code,
                                        message: err.message,
                                    }),
                                    None => Ok(response.result.unwrap_or(Value::Null)),
                                };
                                let _ = tx.send(result);
                            }
                            None => {
                                tracing::debug!(id = response.id, "response for unknown command id");
                            }
                        }
                    }
                    Ok(Message::Event(event)) => {
                        // Nobody listening means the session is shutting down.
                        if event_tx.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Unknown(value)) => {
                        tracing::debug!(frame = %value, "ignoring unrecognized frame");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to parse inbound frame");
                    }
                }
            }

            // Transport is gone: fail everything still outstanding.
            let drained: Vec<_> = pending.lock().drain().collect();
            for (_, tx) in drained {
                let _ = tx.send(Err(Error::ChannelClosed));
            }
        });

        (connection, event_rx)
    }

    /// Sends a command and awaits its response with the default timeout.
    pub async fn command(&self, method: &str, params: Value) -> Result<Value> {
        self.command_with_timeout(method, params, DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    /// Sends a command and awaits its response with an explicit timeout.
    pub async fn command_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(id, method, "sending command");

        // Register before sending so a fast response cannot race the insert.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        let mut guard = CancelGuard {
            id,
            pending: &self.pending,
            completed: false,
        };

        let frame = serde_json::to_value(&Command {
            id,
            method: method.to_string(),
            params,
        })?;

        if self.outbound_tx.send(frame).is_err() {
            return Err(Error::ChannelClosed);
        }

        let result = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => {
                guard.completed = true;
                result
            }
            Ok(Err(_)) => {
                guard.completed = true;
                Err(Error::ChannelClosed)
            }
            Err(_) => Err(Error::CommandTimeout {
                method: method.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        // Attach the method name to target-side rejections.
        result.map_err(|e| match e {
            Error::Cdp { code, message, .. } => Error::Cdp {
                method: method.to_string(),
                code,
                message,
            },
            other => other,
        })
    }
}

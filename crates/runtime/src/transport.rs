//! Websocket transport for the debugging connection.
//!
//! The websocket is split into a reader task and a writer task, both bridged
//! to unbounded mpsc channels. The [`Connection`](crate::connection::Connection)
//! layer only ever sees [`TransportParts`], so it can be driven by plain
//! channels in tests without a live socket.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::{Error, Result};

/// Channel ends handed to the connection layer.
///
/// `outbound_tx` accepts JSON values to be written to the socket;
/// `inbound_rx` yields every JSON frame read from it. Dropping both halves
/// shuts the socket tasks down.
pub struct TransportParts {
    /// Sender for outbound JSON frames.
    pub outbound_tx: mpsc::UnboundedSender<Value>,
    /// Receiver for inbound JSON frames.
    pub inbound_rx: mpsc::UnboundedReceiver<Value>,
}

/// Connect to a websocket debugger URL and spawn the reader/writer tasks.
pub async fn connect(ws_url: &str) -> Result<TransportParts> {
    tracing::debug!(url = ws_url, "connecting to debugger websocket");

    let (stream, _) = tokio_tungstenite::connect_async(ws_url)
        .await
        .map_err(|e| Error::ConnectionFailed {
            url: ws_url.to_string(),
            reason: e.to_string(),
        })?;

    let (mut writer, mut reader) = stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Value>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Value>();

    tokio::spawn(async move {
        while let Some(value) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&value) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize outbound frame");
                    continue;
                }
            };
            if let Err(e) = writer.send(WsMessage::Text(text)).await {
                tracing::error!(error = %e, "websocket write error, stopping writer");
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some(frame) = reader.next().await {
            let message = match frame {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, "websocket read error, stopping reader");
                    break;
                }
            };

            let text = match message {
                WsMessage::Text(text) => text.to_string(),
                WsMessage::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => text,
                    Err(_) => continue,
                },
                WsMessage::Close(_) => {
                    tracing::debug!("websocket closed by remote");
                    break;
                }
                _ => continue,
            };

            let value: Value = match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(error = %e, "discarding unparseable frame");
                    continue;
                }
            };

            if inbound_tx.send(value).is_err() {
                // Connection layer is gone; nothing left to deliver to.
                break;
            }
        }
    });

    tracing::debug!(url = ws_url, "debugger websocket established");

    Ok(TransportParts {
        outbound_tx,
        inbound_rx,
    })
}

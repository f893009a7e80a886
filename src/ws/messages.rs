//! Outbound WebSocket framing for status messages.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::SinkExt;
use futures_util::stream::SplitSink;

use crate::relay::{ClientStatusMessage, StatusSink};

/// Serializes [`ClientStatusMessage`]s as JSON text frames.
#[derive(Debug)]
pub struct WsStatusSink {
    tx: SplitSink<WebSocket, Message>,
}

impl WsStatusSink {
    /// Wraps the write half of a socket.
    #[must_use]
    pub const fn new(tx: SplitSink<WebSocket, Message>) -> Self {
        Self { tx }
    }
}

/// Encodes a status message as a JSON text frame.
#[must_use]
pub fn encode(message: &ClientStatusMessage) -> Message {
    Message::text(serde_json::to_string(message).unwrap_or_default())
}

#[async_trait]
impl StatusSink for WsStatusSink {
    type Error = axum::Error;

    async fn emit(&mut self, message: ClientStatusMessage) -> Result<(), Self::Error> {
        self.tx.send(encode(&message)).await
    }
}

//! Connection supervisor.
//!
//! Reads client commands one at a time and hands each to the
//! [`CommandRelay`] while holding the device lock. Device faults are
//! reported to the client and never end the connection; only a closed or
//! broken socket does.

use axum::extract::ws::{Message, WebSocket};
use futures_util::StreamExt;
use tracing::Instrument;

use super::messages::WsStatusSink;
use crate::config::RelayTiming;
use crate::device::{DeviceHandle, DeviceState};
use crate::relay::{ClientCommand, ClientStatusMessage, CommandRelay, ConversationEnd, StatusSink};

/// Runs the supervisor loop for one WebSocket connection.
pub async fn run_connection(socket: WebSocket, device: DeviceHandle, timing: RelayTiming) {
    let conn_id = uuid::Uuid::new_v4();
    supervise(socket, device, timing)
        .instrument(tracing::info_span!("ws", conn = %conn_id))
        .await;
}

async fn supervise(socket: WebSocket, device: DeviceHandle, timing: RelayTiming) {
    tracing::info!("ws connection opened");

    if device.state() != DeviceState::Open
        && let Err(err) = device.ensure_open().await
    {
        tracing::info!(error = %err, "no controller at connect");
    }

    let (ws_tx, mut ws_rx) = socket.split();
    let mut sink = WsStatusSink::new(ws_tx);
    let mut relay = CommandRelay::new(timing);

    while let Some(frame) = ws_rx.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                tracing::debug!(error = %err, "ws receive failed");
                break;
            }
        };

        let command = match ClientCommand::decode(&text) {
            Ok(command) => command,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring client message");
                continue;
            }
        };
        tracing::info!(?command, "command received");

        if dispatch(command, &device, &mut relay, &mut sink)
            .await
            .is_err()
        {
            break;
        }
    }

    tracing::info!("ws connection closed");
}

/// Runs one command under the device lock.
///
/// # Errors
///
/// Returns the sink's error if the client went away.
pub async fn dispatch<S: StatusSink>(
    command: ClientCommand,
    device: &DeviceHandle,
    relay: &mut CommandRelay,
    sink: &mut S,
) -> Result<(), S::Error> {
    let mut guard = device.lock().await;
    let link = match guard.ensure_open().await {
        Ok(link) => link,
        Err(err) => {
            tracing::warn!(error = %err, "command rejected, controller not connected");
            return sink.emit(ClientStatusMessage::not_connected()).await;
        }
    };

    match relay.converse(command, link, sink).await? {
        ConversationEnd::Terminal(status) => {
            tracing::info!(?command, %status, "conversation complete");
        }
        ConversationEnd::TimedOut => {
            tracing::info!(?command, "conversation timed out");
        }
        ConversationEnd::Faulted(err) => {
            tracing::warn!(?command, error = %err, "closing faulted controller handle");
            guard.invalidate().await;
        }
    }
    Ok(())
}

//! Command relay state machine.
//!
//! One [`CommandRelay`] lives per connection and runs one conversation at
//! a time:
//!
//! ```text
//! Idle ──write──▶ AwaitingResponse ──terminal token──▶ Terminal ─┐
//!   ▲                    │ │                                     │
//!   │                    │ └──deadline passed──▶ TimedOut ───────┤
//!   │                    └────transport fault──▶ Errored ────────┤
//!   └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every device line read while awaiting is forwarded to the client as it
//! arrives. The deadline is fixed at write time; progress lines do not
//! extend it.

use async_trait::async_trait;
use tokio::time::Instant;

use super::protocol::{ClientCommand, ClientStatusMessage, DeviceCommandLine, DeviceStatus};
use crate::config::RelayTiming;
use crate::device::LineTransport;
use crate::error::TransportError;

/// Destination for status messages produced during a conversation.
#[async_trait]
pub trait StatusSink: Send {
    /// Error returned when the client can no longer be reached.
    type Error: std::fmt::Debug + Send;

    /// Delivers one message to the client.
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` if the client is gone.
    async fn emit(&mut self, message: ClientStatusMessage) -> Result<(), Self::Error>;
}

#[cfg(test)]
#[async_trait]
impl StatusSink for Vec<ClientStatusMessage> {
    type Error = std::convert::Infallible;

    async fn emit(&mut self, message: ClientStatusMessage) -> Result<(), Self::Error> {
        self.push(message);
        Ok(())
    }
}

/// Where the relay is in the current conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// No command in flight.
    Idle,
    /// Command written, waiting for status lines.
    AwaitingResponse {
        /// Line that was written.
        command: DeviceCommandLine,
        /// When the conversation gives up.
        deadline: Instant,
    },
    /// A terminal token was received.
    Terminal,
    /// The deadline passed without a terminal token.
    TimedOut,
    /// The transport failed.
    Errored,
}

/// How a conversation ended.
#[derive(Debug)]
pub enum ConversationEnd {
    /// The device sent this terminal token.
    Terminal(String),
    /// No terminal token before the deadline. The handle is still usable.
    TimedOut,
    /// The transport failed; the handle must be invalidated.
    Faulted(TransportError),
}

/// Per-connection relay between client commands and device lines.
#[derive(Debug)]
pub struct CommandRelay {
    timing: RelayTiming,
    state: RelayState,
}

impl CommandRelay {
    /// Creates an idle relay.
    #[must_use]
    pub const fn new(timing: RelayTiming) -> Self {
        Self {
            timing,
            state: RelayState::Idle,
        }
    }

    /// Current state. Always [`RelayState::Idle`] between conversations.
    #[must_use]
    pub const fn state(&self) -> RelayState {
        self.state
    }

    /// Runs one full conversation for `command` and returns to idle.
    ///
    /// Device faults never surface as `Err`; they are reported to the
    /// client and returned as [`ConversationEnd::Faulted`].
    ///
    /// # Errors
    ///
    /// Returns the sink's error if the client disconnects while status
    /// lines are being forwarded.
    pub async fn converse<S: StatusSink>(
        &mut self,
        command: ClientCommand,
        link: &mut dyn LineTransport,
        sink: &mut S,
    ) -> Result<ConversationEnd, S::Error> {
        let end = self.drive(command, link, sink).await;
        self.state = RelayState::Idle;
        end
    }

    async fn drive<S: StatusSink>(
        &mut self,
        command: ClientCommand,
        link: &mut dyn LineTransport,
        sink: &mut S,
    ) -> Result<ConversationEnd, S::Error> {
        let line = command.device_line();
        if let Err(err) = link.write_line(line.as_str().as_bytes()).await {
            return Ok(self.fault(err, sink).await);
        }
        tracing::debug!(port = link.port_name(), command = line.as_str(), "command written");

        self.state = RelayState::AwaitingResponse {
            command: line,
            deadline: Instant::now() + self.timing.response_timeout,
        };

        loop {
            if let RelayState::AwaitingResponse { command, deadline } = self.state
                && Instant::now() >= deadline
            {
                tracing::warn!(
                    command = command.as_str(),
                    timeout_ms = self.timing.response_timeout.as_millis(),
                    "response timeout"
                );
                self.state = RelayState::TimedOut;
                sink.emit(ClientStatusMessage::response_timeout()).await?;
                return Ok(ConversationEnd::TimedOut);
            }

            match link.bytes_available() {
                Ok(true) => {
                    let text = match link.read_line().await {
                        Ok(text) => text,
                        Err(err) => return Ok(self.fault(err, sink).await),
                    };
                    if text.is_empty() {
                        continue;
                    }
                    tracing::debug!(status = %text, "device status");
                    let status = DeviceStatus::parse(&text);
                    sink.emit(status.to_client(self.timing.position_convention))
                        .await?;
                    if status.is_terminal() {
                        self.state = RelayState::Terminal;
                        return Ok(ConversationEnd::Terminal(text));
                    }
                }
                Ok(false) => tokio::time::sleep(self.timing.poll_interval).await,
                Err(err) => return Ok(self.fault(err, sink).await),
            }
        }
    }

    /// Reports a transport fault. A client that is already gone is not an
    /// error here; the fault must still reach the supervisor.
    async fn fault<S: StatusSink>(&mut self, err: TransportError, sink: &mut S) -> ConversationEnd {
        tracing::warn!(error = %err, "lost connection to controller");
        self.state = RelayState::Errored;
        if let Err(sink_err) = sink.emit(ClientStatusMessage::lost_connection()).await {
            tracing::debug!(error = ?sink_err, "client gone before fault was reported");
        }
        ConversationEnd::Faulted(err)
    }
}

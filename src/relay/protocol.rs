//! Wire vocabulary on both sides of the bridge.
//!
//! Client side: JSON `{"action": ...}` in, [`ClientStatusMessage`] out.
//! Device side: one newline-terminated [`DeviceCommandLine`] out,
//! [`DeviceStatus`] lines back.

use serde::{Deserialize, Serialize};

use crate::config::PositionConvention;
use crate::error::DecodeError;

/// A command requested by the browser client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    /// Advance the conveyor through its move sequence.
    MoveConveyor,
    /// Return the conveyor to its home position.
    Home,
}

/// Raw client frame. Unknown fields (e.g. `lipstick`) are ignored.
#[derive(Debug, Deserialize)]
struct ClientFrame {
    action: String,
}

impl ClientCommand {
    /// Decodes a client text frame.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] if the frame is not a JSON object
    /// with a string `action`, and [`DecodeError::UnknownAction`] for any
    /// action outside the supported vocabulary.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let frame: ClientFrame = serde_json::from_str(text)?;
        match frame.action.as_str() {
            "move_conveyor" => Ok(Self::MoveConveyor),
            "home" => Ok(Self::Home),
            _ => Err(DecodeError::UnknownAction(frame.action)),
        }
    }

    /// The device line this command is translated to.
    #[must_use]
    pub const fn device_line(self) -> DeviceCommandLine {
        match self {
            Self::MoveConveyor => DeviceCommandLine::Move,
            Self::Home => DeviceCommandLine::Home,
        }
    }
}

/// The fixed vocabulary the firmware accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommandLine {
    /// `move`
    Move,
    /// `home`
    Home,
}

impl DeviceCommandLine {
    /// Command text without the newline terminator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Home => "home",
        }
    }
}

/// Tokens that end a conversation.
pub const TERMINAL_TOKENS: [&str; 4] = ["sequence_complete", "home_reached", "already_home", "error"];

/// A status line read back from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    text: String,
    step: Option<i64>,
}

impl DeviceStatus {
    /// Parses a trimmed device line.
    ///
    /// `moving_<n>` and `reached_<n>` carry a step number; anything else,
    /// including a progress token whose suffix is not an integer, has none.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let step = ["moving_", "reached_"]
            .iter()
            .find_map(|prefix| line.strip_prefix(prefix))
            .and_then(|rest| rest.parse::<i64>().ok());
        Self {
            text: line.to_string(),
            step,
        }
    }

    /// The status text as sent by the device.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Step number of a progress token.
    #[must_use]
    pub const fn step(&self) -> Option<i64> {
        self.step
    }

    /// Returns `true` if this status ends the conversation.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        TERMINAL_TOKENS.contains(&self.text.as_str())
    }

    /// Builds the client message for this status.
    #[must_use]
    pub fn to_client(&self, convention: PositionConvention) -> ClientStatusMessage {
        ClientStatusMessage {
            status: self.text.clone(),
            message: None,
            position: self.step.map(|n| convention.apply(n)),
        }
    }
}

/// Message sent to the websocket peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStatusMessage {
    /// Device status token, or `"error"`.
    pub status: String,
    /// Human-readable detail for bridge-generated errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Step number for progress tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

impl ClientStatusMessage {
    /// A bridge-generated error.
    #[must_use]
    pub fn error(message: &str) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.to_string()),
            position: None,
        }
    }

    /// No controller could be located.
    #[must_use]
    pub fn not_connected() -> Self {
        Self::error("Pico not connected")
    }

    /// The serial handle faulted mid-conversation.
    #[must_use]
    pub fn lost_connection() -> Self {
        Self::error("Lost connection to Pico")
    }

    /// No terminal status arrived before the deadline.
    #[must_use]
    pub fn response_timeout() -> Self {
        Self::error("Response timeout")
    }
}

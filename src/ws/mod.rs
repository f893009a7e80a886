//! WebSocket layer: upgrade handler, connection supervisor, framing.
//!
//! The endpoint at `/ws` accepts `{"action": "move_conveyor" | "home"}`
//! and streams `{"status", "message"?, "position"?}` objects back until
//! the conversation for that command ends.

pub mod connection;
pub mod handler;
pub mod messages;

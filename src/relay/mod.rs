//! Command relay: client vocabulary, device vocabulary, and the
//! per-connection conversation state machine.

pub mod conversation;
pub mod protocol;

pub use conversation::{CommandRelay, ConversationEnd, RelayState, StatusSink};
pub use protocol::{ClientCommand, ClientStatusMessage, DeviceCommandLine, DeviceStatus};

//! Device layer: discovery, line transport, and the shared handle.
//!
//! The controller is a line-protocol peer on a serial port. Everything
//! above this module talks to it through [`LineTransport`] and obtains it
//! through [`DeviceHandle`].

pub mod handle;
pub mod locator;
pub mod transport;

pub use handle::{DeviceGuard, DeviceHandle, DeviceSnapshot, DeviceState};
pub use locator::{DeviceLocator, PortInfo, SerialLocator};
pub use transport::{LineTransport, SerialLink};

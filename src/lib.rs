//! # conveyor-bridge
//!
//! WebSocket to serial bridge for a conveyor controller.
//!
//! A browser client sends high-level commands over `/ws`; the bridge writes
//! the matching line to the controller's serial port and relays every status
//! line back as JSON until a terminal status arrives or the response timeout
//! elapses.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP)
//!     │
//!     ├── WS supervisor (ws/)          REST diagnostics (api/)
//!     │
//!     ├── CommandRelay (relay/)
//!     │
//!     ├── DeviceHandle (device/)  ── mutex, one conversation at a time
//!     ├── SerialLocator / SerialLink
//!     │
//!     └── Controller (serial line protocol)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod device;
pub mod error;
pub mod relay;
pub mod ws;

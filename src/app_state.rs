//! Shared application state injected into all Axum handlers.

use crate::config::RelayTiming;
use crate::device::DeviceHandle;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The process-wide controller handle.
    pub device: DeviceHandle,
    /// Timing applied to every conversation.
    pub timing: RelayTiming,
}

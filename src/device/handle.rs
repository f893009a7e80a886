//! Process-wide controller handle.
//!
//! [`DeviceHandle`] is cheap to clone and shared by every connection. The
//! transport lives behind an async mutex: a connection holds the
//! [`DeviceGuard`] for a whole conversation, so writes and reads from
//! different connections never interleave on the wire.
//!
//! The current [`DeviceState`] is also published on a `watch` channel, so
//! status endpoints can report it without waiting for an in-flight
//! conversation to release the lock.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, watch};

use super::locator::DeviceLocator;
use super::transport::LineTransport;
use crate::error::LocateError;

/// Lifecycle of the controller handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// No handle; the next command runs discovery.
    Absent,
    /// A port is open.
    Open,
    /// The last handle failed mid-conversation and was closed.
    Faulted,
}

/// Point-in-time view of the handle, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct DeviceSnapshot {
    /// Current state.
    pub state: DeviceState,
    /// Port the open handle is attached to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

impl DeviceSnapshot {
    const fn absent() -> Self {
        Self {
            state: DeviceState::Absent,
            port: None,
        }
    }
}

#[derive(Debug)]
struct DeviceSlot {
    link: Option<Box<dyn LineTransport>>,
    snapshot: watch::Sender<DeviceSnapshot>,
}

impl DeviceSlot {
    fn publish(&self, state: DeviceState) {
        let port = self.link.as_ref().map(|l| l.port_name().to_string());
        self.snapshot.send_replace(DeviceSnapshot { state, port });
    }
}

/// Shared, injectable owner of the controller handle.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    slot: Arc<Mutex<DeviceSlot>>,
    snapshot: watch::Receiver<DeviceSnapshot>,
    locator: Arc<dyn DeviceLocator>,
}

impl DeviceHandle {
    /// Creates an absent handle that discovers devices through `locator`.
    #[must_use]
    pub fn new(locator: Arc<dyn DeviceLocator>) -> Self {
        let (tx, rx) = watch::channel(DeviceSnapshot::absent());
        Self {
            slot: Arc::new(Mutex::new(DeviceSlot {
                link: None,
                snapshot: tx,
            })),
            snapshot: rx,
            locator,
        }
    }

    /// Runs discovery unless a handle is already open.
    ///
    /// # Errors
    ///
    /// Returns the locator's [`LocateError`] if no controller is reachable.
    pub async fn ensure_open(&self) -> Result<(), LocateError> {
        let mut guard = self.lock().await;
        guard.ensure_open().await?;
        Ok(())
    }

    /// Takes exclusive access to the handle.
    pub async fn lock(&self) -> DeviceGuard<'_> {
        DeviceGuard {
            slot: self.slot.lock().await,
            locator: self.locator.as_ref(),
        }
    }

    /// Current state, without waiting for the lock.
    #[must_use]
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Shorthand for `snapshot().state`.
    #[must_use]
    pub fn state(&self) -> DeviceState {
        self.snapshot.borrow().state
    }

    /// The locator used for discovery.
    #[must_use]
    pub fn locator(&self) -> &dyn DeviceLocator {
        self.locator.as_ref()
    }

    /// Closes the handle if open. Called on shutdown.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(mut link) = slot.link.take() {
            link.close().await;
        }
        slot.publish(DeviceState::Absent);
    }
}

/// Exclusive access to the controller for the duration of a conversation.
#[derive(Debug)]
pub struct DeviceGuard<'a> {
    slot: MutexGuard<'a, DeviceSlot>,
    locator: &'a dyn DeviceLocator,
}

impl DeviceGuard<'_> {
    /// Returns the open transport, running discovery first if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError`] if discovery finds no controller; the state
    /// is then [`DeviceState::Absent`].
    pub async fn ensure_open(&mut self) -> Result<&mut dyn LineTransport, LocateError> {
        if self.slot.link.is_none() {
            match self.locator.locate().await {
                Ok(link) => {
                    self.slot.link = Some(link);
                    self.slot.publish(DeviceState::Open);
                }
                Err(err) => {
                    self.slot.publish(DeviceState::Absent);
                    return Err(err);
                }
            }
        }
        match self.slot.link.as_deref_mut() {
            Some(link) => Ok(link),
            None => Err(LocateError::DeviceNotFound { tried: 0 }),
        }
    }

    /// Closes a handle that faulted; the next command rediscovers.
    pub async fn invalidate(&mut self) {
        if let Some(mut link) = self.slot.link.take() {
            link.close().await;
        }
        self.slot.publish(DeviceState::Faulted);
    }
}

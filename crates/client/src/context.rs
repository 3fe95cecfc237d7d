//! The value a mounted connection exposes to its consumers.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use serde_json::Value;
use sightline_shared::EventName;

use crate::channel::EventChannel;
use crate::error::{ClientError, ClientResult};
use crate::transport::Transport;

/// Shared, nullable reference to the live transport.
///
/// Only the [`crate::ConnectionManager`] fills or clears it; everyone else can
/// only read.
#[derive(Clone, Default)]
pub struct SocketRef {
    inner: Arc<RwLock<Option<Arc<dyn Transport>>>>,
}

impl SocketRef {
    pub fn current(&self) -> Option<Arc<dyn Transport>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_present(&self) -> bool {
        self.current().is_some()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Option<Arc<dyn Transport>>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn same_ref(&self, other: &SocketRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SocketRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketRef")
            .field("present", &self.is_present())
            .finish()
    }
}

/// Socket handle plus the two inbound channels.
///
/// Clones share every cell, so the value a consumer captured once stays valid
/// for the provider's whole lifetime.
#[derive(Clone, Debug)]
pub struct SocketContext {
    socket: SocketRef,
    on_metrics: EventChannel,
    on_predictions: EventChannel,
}

impl Default for SocketContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketContext {
    pub fn new() -> Self {
        Self {
            socket: SocketRef::default(),
            on_metrics: EventChannel::new(EventName::Metrics),
            on_predictions: EventChannel::new(EventName::Predictions),
        }
    }

    pub fn socket(&self) -> &SocketRef {
        &self.socket
    }

    pub fn on_metrics(&self) -> &EventChannel {
        &self.on_metrics
    }

    pub fn on_predictions(&self) -> &EventChannel {
        &self.on_predictions
    }

    /// Channel for a data event; lifecycle events have none.
    pub fn channel(&self, event: EventName) -> Option<&EventChannel> {
        match event {
            EventName::Metrics => Some(&self.on_metrics),
            EventName::Predictions => Some(&self.on_predictions),
            _ => None,
        }
    }

    /// Send an event through the live socket.
    pub fn emit(&self, event: &str, payload: Value) -> ClientResult<()> {
        self.socket
            .current()
            .ok_or(ClientError::NotConnected)?
            .emit(event, payload)
    }

    /// Whether both values were handed out by the same provider.
    pub fn same_context(&self, other: &SocketContext) -> bool {
        self.socket.same_ref(&other.socket)
            && self.on_metrics.same_channel(&other.on_metrics)
            && self.on_predictions.same_channel(&other.on_predictions)
    }
}

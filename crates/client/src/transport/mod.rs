//! Socket transport abstraction.
//!
//! The connection manager only depends on [`Transport`], which mirrors the
//! surface of a Socket.IO client: register handlers by event name, start and
//! stop the session explicitly, emit events. [`SocketIoTransport`] is the
//! websocket implementation used against the vision backend.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::ClientResult;

mod socketio;

pub use socketio::SocketIoTransport;

/// Handler for one event name.
pub type Handler = Arc<dyn Fn(Value) + Send + Sync>;

/// Builds a fresh, not yet connected transport for a config.
pub type TransportFactory = Arc<dyn Fn(&ClientConfig) -> Arc<dyn Transport> + Send + Sync>;

/// One client session with the event server.
///
/// Construction must not start the connection; callers register handlers
/// first and then call [`Transport::connect`]. No method blocks.
pub trait Transport: Send + Sync {
    /// Add a handler for `event`. Several handlers per event are allowed.
    fn on(&self, event: &str, handler: Handler);

    /// Remove every handler registered for `event`.
    fn off(&self, event: &str);

    /// Start connecting. Failures are reported through `connect_error`.
    fn connect(&self);

    /// Close the session. Handlers stay registered until `off` is called.
    fn disconnect(&self);

    /// Send an event to the server.
    fn emit(&self, event: &str, payload: Value) -> ClientResult<()>;

    fn is_connected(&self) -> bool;
}

/// Event name to handler map shared between a transport and its session task.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    inner: Arc<RwLock<HashMap<String, Vec<Handler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, event: &str, handler: Handler) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    pub fn off(&self, event: &str) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(event);
    }

    pub fn has(&self, event: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .is_some_and(|handlers| !handlers.is_empty())
    }

    /// Number of event names with at least one handler.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|handlers| !handlers.is_empty())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke the handlers for `event` locally. Returns how many ran.
    ///
    /// Handlers are cloned out before running so they may re-enter the
    /// registry.
    pub fn dispatch(&self, event: &str, payload: Value) -> usize {
        let handlers: Vec<Handler> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .cloned()
            .unwrap_or_default();

        for handler in &handlers {
            handler(payload.clone());
        }
        handlers.len()
    }
}

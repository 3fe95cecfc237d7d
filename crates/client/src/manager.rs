//! Connection manager: owns one transport per mounted scope and fans the
//! "metrics" and "predictions" events out to the context's channels.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use sightline_shared::{error_detail, EventName};

use crate::config::ClientConfig;
use crate::context::SocketContext;
use crate::notify::{ErrorDisplay, CONNECT_FAILURE_MESSAGE};
use crate::scope::ConnectionScope;
use crate::transport::{SocketIoTransport, Transport, TransportFactory};

/// Lifecycle of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Never mounted
    Uninitialized,
    /// Transport created and started; may still be connecting
    Connected,
    /// Transport disconnected and released
    TornDown,
}

pub struct ConnectionManager {
    config: ClientConfig,
    factory: TransportFactory,
    errors: Arc<dyn ErrorDisplay>,
    context: SocketContext,
    state: Mutex<ManagerState>,
}

impl ConnectionManager {
    pub fn new(
        config: ClientConfig,
        factory: TransportFactory,
        errors: Arc<dyn ErrorDisplay>,
    ) -> Self {
        Self {
            config,
            factory,
            errors,
            context: SocketContext::new(),
            state: Mutex::new(ManagerState::Uninitialized),
        }
    }

    /// Manager backed by the websocket Socket.IO transport.
    pub fn with_socket_io(config: ClientConfig, errors: Arc<dyn ErrorDisplay>) -> Self {
        Self::new(config, SocketIoTransport::factory(), errors)
    }

    /// The stable context value. Every call returns handles to the same cells.
    pub fn context(&self) -> SocketContext {
        self.context.clone()
    }

    pub fn state(&self) -> ManagerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ManagerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Initialize and hand back a guard that tears down when dropped.
    pub fn mount(self: &Arc<Self>) -> ConnectionScope {
        tracing::debug!("Connection scope mounted");
        self.initialize();
        ConnectionScope::new(self.clone())
    }

    /// Create the transport, register handlers, then start connecting.
    ///
    /// Does nothing while a transport already exists. No lock is held while
    /// the factory, handler registration or `connect` run.
    pub fn initialize(&self) {
        if self.context.socket().is_present() {
            tracing::debug!("Transport already exists, skipping initialize");
            return;
        }

        let transport = (self.factory)(&self.config);
        self.register_handlers(transport.as_ref());

        {
            let mut socket = self.context.socket().write();
            if socket.is_some() {
                tracing::debug!("Transport installed concurrently, discarding ours");
                return;
            }
            *socket = Some(transport.clone());
        }

        self.set_state(ManagerState::Connected);
        transport.connect();
    }

    /// Disconnect, unregister every handler and drop the transport.
    ///
    /// The handle is cleared first, so handlers that run during disconnect
    /// already see no socket. Idempotent.
    pub fn teardown(&self) {
        let Some(transport) = self.context.socket().write().take() else {
            return;
        };

        transport.disconnect();
        for event in EventName::ALL {
            transport.off(event.as_str());
        }
        drop(transport);

        self.set_state(ManagerState::TornDown);
        tracing::debug!("Connection torn down");
    }

    fn register_handlers(&self, transport: &dyn Transport) {
        let server_url = self.config.server_url.clone();
        transport.on(
            EventName::Connect.as_str(),
            Arc::new(move |_| {
                tracing::info!(url = %server_url, "Connected to event server");
            }),
        );

        transport.on(
            EventName::Disconnect.as_str(),
            Arc::new(|reason: Value| {
                tracing::info!(%reason, "Disconnected from event server");
            }),
        );

        let errors = self.errors.clone();
        let server_url = self.config.server_url.clone();
        transport.on(
            EventName::ConnectError.as_str(),
            Arc::new(move |payload: Value| {
                tracing::error!(
                    url = %server_url,
                    error = %error_detail(&payload),
                    "Failed to connect to event server"
                );
                errors.display_error(CONNECT_FAILURE_MESSAGE);
            }),
        );

        for event in EventName::ALL.into_iter().filter(|e| !e.is_lifecycle()) {
            let Some(channel) = self.context.channel(event).cloned() else {
                continue;
            };
            transport.on(
                channel.event().as_str(),
                Arc::new(move |payload: Value| {
                    channel.dispatch(payload);
                }),
            );
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("context", &self.context)
            .finish()
    }
}

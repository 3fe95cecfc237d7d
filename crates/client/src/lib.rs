//! Sightline client - live event feed for the vision dashboard.
//!
//! Connects to the backend's Socket.IO server, keeps the connection alive for
//! as long as a [`ConnectionScope`] is mounted, and hands "metrics" and
//! "predictions" payloads to whichever callbacks consumers installed.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sightline_client::{ClientConfig, ConnectionManager, TracingErrorDisplay};
//!
//! # async fn run() {
//! let manager = Arc::new(ConnectionManager::with_socket_io(
//!     ClientConfig::default(),
//!     Arc::new(TracingErrorDisplay),
//! ));
//! manager.context().on_metrics().set(|metrics| println!("{metrics}"));
//!
//! let scope = manager.mount();
//! // ... later
//! scope.unmount();
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod manager;
pub mod notify;
pub mod scope;
pub mod transport;

#[cfg(feature = "dioxus")]
pub mod provider;

pub use channel::{Callback, CallbackSlot, EventChannel, Subscribers, Subscription};
pub use config::ClientConfig;
pub use context::{SocketContext, SocketRef};
pub use error::{ClientError, ClientResult};
pub use manager::{ConnectionManager, ManagerState};
pub use notify::{ErrorDisplay, TracingErrorDisplay, CONNECT_FAILURE_MESSAGE};
pub use scope::ConnectionScope;
pub use transport::{Handler, HandlerRegistry, SocketIoTransport, Transport, TransportFactory};

#[cfg(feature = "dioxus")]
pub use provider::{
    use_socket_context, use_socket_errors, SocketErrors, SocketProvider, SocketSetup,
};

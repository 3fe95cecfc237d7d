//! Dioxus binding: a provider component that owns the connection for its
//! subtree and hooks to read it from descendants.
//!
//! ```rust,ignore
//! rsx! {
//!     SocketProvider {
//!         Dashboard {}
//!     }
//! }
//!
//! fn Dashboard() -> Element {
//!     let socket = use_socket_context()?;
//!     let mut fps = use_signal(|| 0.0);
//!     use_hook(move || socket.on_metrics().set(move |m| fps.set(m["fps"].as_f64().unwrap_or(0.0))));
//!     rsx! { "{fps} fps" }
//! }
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use dioxus::prelude::*;
use futures_channel::mpsc::{unbounded, UnboundedReceiver};
use futures_util::StreamExt;

use crate::config::ClientConfig;
use crate::context::SocketContext;
use crate::error::{ClientError, ClientResult};
use crate::manager::ConnectionManager;
use crate::notify::ErrorDisplay;
use crate::scope::ConnectionScope;
use crate::transport::{SocketIoTransport, TransportFactory};

/// Latest user-facing error raised by the provider, for a snackbar to render.
#[derive(Clone, Copy)]
pub struct SocketErrors {
    pub last: Signal<Option<String>>,
}

/// How a [`SocketProvider`] builds its connection.
///
/// Defaults to the environment config and the websocket transport.
#[derive(Clone)]
pub struct SocketSetup {
    pub config: ClientConfig,
    pub factory: TransportFactory,
}

impl SocketSetup {
    pub fn new(config: ClientConfig, factory: TransportFactory) -> Self {
        Self { config, factory }
    }
}

impl Default for SocketSetup {
    fn default() -> Self {
        Self::new(ClientConfig::from_env(), SocketIoTransport::factory())
    }
}

impl PartialEq for SocketSetup {
    fn eq(&self, other: &Self) -> bool {
        self.config == other.config && Arc::ptr_eq(&self.factory, &other.factory)
    }
}

struct ProviderState {
    scope: Option<ConnectionScope>,
    errors: Option<UnboundedReceiver<String>>,
}

/// Mounts a connection on first render and tears it down on unmount.
///
/// `setup` is read once; later prop changes do not remount the connection.
#[component]
pub fn SocketProvider(#[props(default)] setup: SocketSetup, children: Element) -> Element {
    let last_error = use_signal(|| None::<String>);

    let (state, context) = use_hook(|| {
        // Transport callbacks run off the UI thread; errors are funneled
        // through a channel and written to the signal from a UI task.
        let (sender, receiver) = unbounded::<String>();
        let errors: Arc<dyn ErrorDisplay> = Arc::new(move |message: &str| {
            let _ = sender.unbounded_send(message.to_string());
        });

        let manager = Arc::new(ConnectionManager::new(
            setup.config.clone(),
            setup.factory.clone(),
            errors,
        ));
        let context = manager.context();
        let state = ProviderState {
            scope: Some(manager.mount()),
            errors: Some(receiver),
        };
        (Rc::new(RefCell::new(state)), context)
    });

    let errors_state = state.clone();
    use_future(move || {
        let receiver = errors_state.borrow_mut().errors.take();
        let mut last_error = last_error;
        async move {
            let Some(mut receiver) = receiver else {
                return;
            };
            while let Some(message) = receiver.next().await {
                last_error.set(Some(message));
            }
        }
    });

    use_drop(move || {
        state.borrow_mut().scope.take();
    });

    use_context_provider(|| context);
    use_context_provider(|| SocketErrors { last: last_error });

    children
}

/// The nearest provider's context, or [`ClientError::OutsideProvider`].
pub fn use_socket_context() -> ClientResult<SocketContext> {
    try_use_context::<SocketContext>().ok_or(ClientError::OutsideProvider)
}

pub fn use_socket_errors() -> ClientResult<SocketErrors> {
    try_use_context::<SocketErrors>().ok_or(ClientError::OutsideProvider)
}

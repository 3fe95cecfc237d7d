//! In-memory transport and recorders shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use sightline_client::{
    ClientConfig, ClientError, ClientResult, ErrorDisplay, Handler, HandlerRegistry, Transport,
    TransportFactory,
};

/// How a [`FakeTransport`] answers `connect`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    Succeed,
    Fail,
}

/// Transport double that "connects" synchronously and lets the test play the
/// server by pushing events.
pub struct FakeTransport {
    handlers: HandlerRegistry,
    outcome: ConnectOutcome,
    connected: AtomicBool,
    /// Connections alive across every transport built by the same factory
    live: Arc<AtomicUsize>,
    emitted: Mutex<Vec<(String, Value)>>,
}

impl FakeTransport {
    pub fn server_emit(&self, event: &str, payload: Value) -> usize {
        if !self.connected.load(Ordering::SeqCst) {
            return 0;
        }
        self.handlers.dispatch(event, payload)
    }

    /// Deliver an event even if the session is closed, as a late frame would.
    pub fn late_delivery(&self, event: &str, payload: Value) -> usize {
        self.handlers.dispatch(event, payload)
    }

    pub fn registered(&self, event: &str) -> bool {
        self.handlers.has(event)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.emitted.lock().unwrap().clone()
    }
}

impl Transport for FakeTransport {
    fn on(&self, event: &str, handler: Handler) {
        self.handlers.on(event, handler);
    }

    fn off(&self, event: &str) {
        self.handlers.off(event);
    }

    fn connect(&self) {
        match self.outcome {
            ConnectOutcome::Succeed => {
                if !self.connected.swap(true, Ordering::SeqCst) {
                    self.live.fetch_add(1, Ordering::SeqCst);
                }
                self.handlers.dispatch("connect", Value::Null);
            }
            ConnectOutcome::Fail => {
                self.handlers
                    .dispatch("connect_error", json!("connection refused"));
            }
        }
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.live.fetch_sub(1, Ordering::SeqCst);
            self.handlers
                .dispatch("disconnect", json!("io client disconnect"));
        }
    }

    fn emit(&self, event: &str, payload: Value) -> ClientResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ClientError::NotConnected);
        }
        self.emitted.lock().unwrap().push((event.to_string(), payload));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Factory that remembers every transport it built.
#[derive(Clone)]
pub struct FakeFactory {
    pub outcome: ConnectOutcome,
    pub live: Arc<AtomicUsize>,
    pub built: Arc<Mutex<Vec<Arc<FakeTransport>>>>,
}

impl FakeFactory {
    pub fn new(outcome: ConnectOutcome) -> Self {
        Self {
            outcome,
            live: Arc::new(AtomicUsize::new(0)),
            built: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn factory(&self) -> TransportFactory {
        let this = self.clone();
        Arc::new(move |_config: &ClientConfig| {
            let transport = Arc::new(FakeTransport {
                handlers: HandlerRegistry::new(),
                outcome: this.outcome,
                connected: AtomicBool::new(false),
                live: this.live.clone(),
                emitted: Mutex::new(Vec::new()),
            });
            this.built.lock().unwrap().push(transport.clone());
            transport as Arc<dyn Transport>
        })
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn built(&self) -> usize {
        self.built.lock().unwrap().len()
    }

    pub fn last(&self) -> Arc<FakeTransport> {
        self.built.lock().unwrap().last().cloned().expect("no transport built")
    }
}

/// Error display that records every message.
#[derive(Default)]
pub struct RecordingDisplay {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingDisplay {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl ErrorDisplay for RecordingDisplay {
    fn display_error(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// Callback that records every payload it receives.
pub fn recorder() -> (Arc<Mutex<Vec<Value>>>, impl Fn(Value) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    (seen, move |payload| seen_clone.lock().unwrap().push(payload))
}

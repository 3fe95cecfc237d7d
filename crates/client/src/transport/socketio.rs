//! Socket.IO over websocket, driven by a tokio task per session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use sightline_shared::{
    error_detail, payload_from_args, EnginePacket, EventName, Handshake, SocketPacket,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{Handler, HandlerRegistry, Transport, TransportFactory};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Commands from the public handle to the session task.
enum Command {
    Emit(SocketPacket),
    Close,
}

/// A running session task.
struct Session {
    commands: UnboundedSender<Command>,
    task: JoinHandle<()>,
    /// Set once disconnect is requested; the task stops dispatching.
    closing: Arc<AtomicBool>,
}

/// Socket.IO client with autoconnect disabled: nothing touches the network
/// until [`Transport::connect`] is called.
pub struct SocketIoTransport {
    config: ClientConfig,
    handlers: HandlerRegistry,
    connected: Arc<AtomicBool>,
    session: Mutex<Option<Session>>,
}

impl SocketIoTransport {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            handlers: HandlerRegistry::new(),
            connected: Arc::new(AtomicBool::new(false)),
            session: Mutex::new(None),
        }
    }

    /// Factory for [`crate::ConnectionManager`].
    pub fn factory() -> TransportFactory {
        Arc::new(|config: &ClientConfig| {
            Arc::new(SocketIoTransport::new(config.clone())) as Arc<dyn Transport>
        })
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for SocketIoTransport {
    fn on(&self, event: &str, handler: Handler) {
        self.handlers.on(event, handler);
    }

    fn off(&self, event: &str) {
        self.handlers.off(event);
    }

    fn connect(&self) {
        let mut session = self.session();
        if session.as_ref().is_some_and(|s| !s.task.is_finished()) {
            tracing::debug!(url = %self.config.server_url, "Session already active, ignoring connect");
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                drop(session);
                let error = ClientError::NoRuntime;
                tracing::error!("Cannot connect to {}: {}", self.config.server_url, error);
                self.handlers
                    .dispatch(EventName::ConnectError.as_str(), json!(error.to_string()));
                return;
            }
        };

        let (commands, receiver) = unbounded_channel();
        let closing = Arc::new(AtomicBool::new(false));
        let context = SessionContext {
            config: self.config.clone(),
            handlers: self.handlers.clone(),
            connected: self.connected.clone(),
            closing: closing.clone(),
        };

        tracing::info!(url = %self.config.server_url, namespace = %self.config.namespace, "Connecting");
        let task = runtime.spawn(run_session(context, receiver));

        *session = Some(Session {
            commands,
            task,
            closing,
        });
    }

    fn disconnect(&self) {
        let Some(session) = self.session().take() else {
            return;
        };

        session.closing.store(true, Ordering::SeqCst);
        if session.commands.send(Command::Close).is_err() {
            session.task.abort();
        }

        if self.connected.swap(false, Ordering::SeqCst) {
            self.handlers.dispatch(
                EventName::Disconnect.as_str(),
                json!("io client disconnect"),
            );
        }
    }

    fn emit(&self, event: &str, payload: Value) -> ClientResult<()> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let session = self.session();
        let session = session.as_ref().ok_or(ClientError::NotConnected)?;
        session
            .commands
            .send(Command::Emit(SocketPacket::event(
                &self.config.namespace,
                event,
                payload,
            )))
            .map_err(|_| ClientError::NotConnected)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for SocketIoTransport {
    fn drop(&mut self) {
        if let Some(session) = self.session().take() {
            session.closing.store(true, Ordering::SeqCst);
            if session.commands.send(Command::Close).is_err() {
                session.task.abort();
            }
        }
    }
}

/// State the session task shares with the public handle.
struct SessionContext {
    config: ClientConfig,
    handlers: HandlerRegistry,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
}

impl SessionContext {
    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    fn dispatch(&self, event: &str, payload: Value) {
        if !self.is_closing() {
            self.handlers.dispatch(event, payload);
        }
    }

    fn fail(&self, error: ClientError) {
        tracing::warn!(url = %self.config.server_url, "Connection attempt failed: {}", error);
        self.dispatch(EventName::ConnectError.as_str(), json!(error.to_string()));
    }
}

/// What the session loop should do after a frame.
enum FrameAction {
    Nothing,
    Reply(String),
    Disconnected(String),
}

async fn run_session(context: SessionContext, mut commands: UnboundedReceiver<Command>) {
    let opened = tokio::select! {
        result = tokio::time::timeout(context.config.connect_timeout, open(&context)) => result,
        _ = wait_for_close(&mut commands) => {
            tracing::debug!("Disconnect requested before the session opened");
            return;
        }
    };

    let (ws, handshake) = match opened {
        Ok(Ok(opened)) => opened,
        Ok(Err(e)) => {
            context.fail(e);
            return;
        }
        Err(_) => {
            context.fail(ClientError::ConnectionFailure(format!(
                "timed out after {}ms",
                context.config.connect_timeout.as_millis()
            )));
            return;
        }
    };

    if !mark_connected(&context) {
        let mut ws = ws;
        let _ = ws.close(None).await;
        return;
    }

    tracing::info!(sid = %handshake.sid, "Socket.IO session established");
    context.dispatch(EventName::Connect.as_str(), Value::Null);

    let namespace = context.config.namespace.clone();
    let liveness = handshake.liveness_window();
    let (mut write, mut read) = ws.split();

    // Reset by inbound frames only.
    let idle = tokio::time::sleep(liveness);
    tokio::pin!(idle);

    let reason = 'session: loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Emit(packet)) => {
                    if let Err(e) = write.send(Message::text(packet.to_frame())).await {
                        break 'session format!("transport error: {}", e);
                    }
                }
                Some(Command::Close) | None => {
                    let _ = write
                        .send(Message::text(SocketPacket::disconnect(&namespace).to_frame()))
                        .await;
                    let _ = write.send(Message::Close(None)).await;
                    context.connected.store(false, Ordering::SeqCst);
                    tracing::info!("Socket.IO session closed by client");
                    return;
                }
            },
            _ = &mut idle => break 'session "ping timeout".to_string(),
            frame = read.next() => {
                idle.as_mut().reset(Instant::now() + liveness);
                match frame {
                    None | Some(Ok(Message::Close(_))) => {
                        break 'session "transport close".to_string()
                    }
                    Some(Err(e)) => break 'session format!("transport error: {}", e),
                    Some(Ok(Message::Text(text))) => match handle_frame(&context, text.as_str()) {
                        FrameAction::Nothing => {}
                        FrameAction::Reply(reply) => {
                            if let Err(e) = write.send(Message::text(reply)).await {
                                break 'session format!("transport error: {}", e);
                            }
                        }
                        FrameAction::Disconnected(reason) => break 'session reason,
                    },
                    Some(Ok(_)) => {}
                }
            }
        }
    };

    context.connected.store(false, Ordering::SeqCst);
    tracing::info!(%reason, "Socket.IO session ended");
    context.dispatch(EventName::Disconnect.as_str(), json!(reason));
}

/// Flag the session as connected unless a disconnect was requested.
///
/// `disconnect` sets `closing` before clearing `connected`, so re-reading
/// `closing` after the store catches a disconnect that raced the handshake.
fn mark_connected(context: &SessionContext) -> bool {
    if context.is_closing() {
        return false;
    }
    context.connected.store(true, Ordering::SeqCst);
    if context.is_closing() {
        context.connected.store(false, Ordering::SeqCst);
        return false;
    }
    true
}

/// Handle one text frame of an established session.
fn handle_frame(context: &SessionContext, frame: &str) -> FrameAction {
    let packet = match EnginePacket::decode(frame) {
        Ok(packet) => packet,
        Err(e) => {
            tracing::warn!("Dropping malformed frame: {}", e);
            return FrameAction::Nothing;
        }
    };

    match packet {
        EnginePacket::Ping(data) => FrameAction::Reply(EnginePacket::Pong(data).encode()),
        EnginePacket::Close => FrameAction::Disconnected("transport close".to_string()),
        EnginePacket::Message(inner) => match SocketPacket::decode(&inner) {
            Ok(packet) if packet.namespace() != context.config.namespace => FrameAction::Nothing,
            Ok(SocketPacket::Event { name, args, .. }) => {
                tracing::trace!(event = %name, "Event received");
                context.dispatch(&name, payload_from_args(args));
                FrameAction::Nothing
            }
            Ok(SocketPacket::Disconnect { .. }) => {
                FrameAction::Disconnected("io server disconnect".to_string())
            }
            Ok(SocketPacket::ConnectError { data, .. }) => {
                context.dispatch(EventName::ConnectError.as_str(), data);
                FrameAction::Disconnected("connect error".to_string())
            }
            Ok(_) => FrameAction::Nothing,
            Err(e) => {
                tracing::warn!("Dropping malformed packet: {}", e);
                FrameAction::Nothing
            }
        },
        _ => FrameAction::Nothing,
    }
}

/// Websocket connect, Engine.IO handshake and namespace connect.
async fn open(context: &SessionContext) -> ClientResult<(WsStream, Handshake)> {
    let url = context.config.websocket_url()?;
    let namespace = &context.config.namespace;

    let (mut ws, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| ClientError::ConnectionFailure(e.to_string()))?;

    let handshake = loop {
        match next_packet(&mut ws).await? {
            EnginePacket::Open(handshake) => break handshake,
            other => tracing::debug!(?other, "Ignoring packet before open"),
        }
    };

    send_text(&mut ws, SocketPacket::connect(namespace).to_frame()).await?;

    loop {
        match next_packet(&mut ws).await? {
            EnginePacket::Ping(data) => send_text(&mut ws, EnginePacket::Pong(data).encode()).await?,
            EnginePacket::Message(inner) => match SocketPacket::decode(&inner)? {
                SocketPacket::Connect { namespace: ns, .. } if &ns == namespace => {
                    return Ok((ws, handshake));
                }
                SocketPacket::ConnectError { namespace: ns, data } if &ns == namespace => {
                    return Err(ClientError::ConnectionFailure(error_detail(&data)));
                }
                _ => {}
            },
            EnginePacket::Close => {
                return Err(ClientError::ConnectionFailure(
                    "server closed the session during handshake".to_string(),
                ))
            }
            _ => {}
        }
    }
}

async fn next_packet(ws: &mut WsStream) -> ClientResult<EnginePacket> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(EnginePacket::decode(text.as_str())?),
            Some(Ok(Message::Close(_))) | None => {
                return Err(ClientError::ConnectionFailure(
                    "connection closed during handshake".to_string(),
                ))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(ClientError::ConnectionFailure(e.to_string())),
        }
    }
}

async fn send_text(ws: &mut WsStream, frame: String) -> ClientResult<()> {
    ws.send(Message::text(frame))
        .await
        .map_err(|e| ClientError::ConnectionFailure(e.to_string()))
}

async fn wait_for_close(commands: &mut UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        if matches!(command, Command::Close) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn context() -> SessionContext {
        SessionContext {
            config: ClientConfig::default(),
            handlers: HandlerRegistry::new(),
            connected: Arc::new(AtomicBool::new(true)),
            closing: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn test_ping_gets_pong() {
        assert!(matches!(
            handle_frame(&context(), "2"),
            FrameAction::Reply(reply) if reply == "3"
        ));
    }

    #[test]
    fn test_event_dispatch_respects_closing_flag() {
        let context = context();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        context.handlers.on(
            "predictions",
            Arc::new(move |_| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        handle_frame(&context, r#"42["predictions",{"boxes":[]}]"#);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        context.closing.store(true, Ordering::SeqCst);
        handle_frame(&context, r#"42["predictions",{"boxes":[]}]"#);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_other_namespace_is_ignored() {
        let context = context();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        context.handlers.on(
            "metrics",
            Arc::new(move |_| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        handle_frame(&context, r#"42/admin,["metrics",{"cpu":1}]"#);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_server_disconnect_ends_session() {
        assert!(matches!(
            handle_frame(&context(), "41"),
            FrameAction::Disconnected(reason) if reason == "io server disconnect"
        ));
        assert!(matches!(
            handle_frame(&context(), "1"),
            FrameAction::Disconnected(_)
        ));
        assert!(matches!(handle_frame(&context(), "x"), FrameAction::Nothing));
    }

    #[test]
    fn test_mark_connected_respects_closing() {
        let context = context();
        context.connected.store(false, Ordering::SeqCst);
        assert!(mark_connected(&context));
        assert!(context.connected.load(Ordering::SeqCst));

        context.connected.store(false, Ordering::SeqCst);
        context.closing.store(true, Ordering::SeqCst);
        assert!(!mark_connected(&context));
        assert!(!context.connected.load(Ordering::SeqCst));
    }

    #[test]
    fn test_connect_without_runtime_reports_connect_error() {
        let transport = SocketIoTransport::new(ClientConfig::default());
        let errors = Arc::new(AtomicUsize::new(0));
        let errors_clone = errors.clone();
        transport.on(
            "connect_error",
            Arc::new(move |_| {
                errors_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        transport.connect();
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.emit("metrics", Value::Null),
            Err(ClientError::NotConnected)
        ));
        transport.disconnect();
    }
}

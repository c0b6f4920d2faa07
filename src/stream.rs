//! Event stream client: one WebSocket per generation session.
//!
//! The socket is owned by a background task. Decoded events travel to the
//! client over a channel; the client hands them out in arrival order until
//! the session ends. State changes are published on a watch channel so
//! callers can await readiness instead of polling for it.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──handshake──▶ Open ──close──▶ Closed
//!                        │                      │
//!                        └──── failure ─────────┴──────────▶ ClosedError
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{SinkExt, StreamExt};
use opentelemetry::KeyValue;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{Instrument, Span, debug, info, warn};

use crate::error::{Error, Result};
use crate::event::{ControlFrame, StreamEvent, decode_frame};
use crate::model::SessionId;
use crate::telemetry::metrics;

/// Reported when the transport fails at any point.
pub const CONNECTION_ERROR_MESSAGE: &str = "WebSocket connection error";
/// Reported when `start` is requested while the stream is not open.
pub const NOT_CONNECTED_MESSAGE: &str = "WebSocket is not connected";

/// Lifecycle of a stream client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Open,
    Closed,
    ClosedError,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::ClosedError)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::ClosedError => "closed_error",
        }
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback interface over a stream's events. Every method defaults to a no-op.
pub trait StreamObserver {
    fn on_ready(&mut self, _message: Option<&str>) {}
    fn on_token(&mut self, _chunk: &str, _node: Option<&str>) {}
    fn on_node_complete(&mut self, _node: Option<&str>, _state: &Value) {}
    fn on_complete(&mut self, _message: Option<&str>) {}
    /// Backend `error` events arrive as [`Error::Protocol`], transport
    /// failures as [`Error::StreamTransport`].
    fn on_error(&mut self, _error: Error) {}
    /// The stream delivered its last event.
    fn on_close(&mut self) {}
}

enum Command {
    Start,
    Close,
}

enum Delivery {
    Event(StreamEvent),
    Failed(Error),
    Closed,
}

/// Client side of one generation event stream.
pub struct EventStreamClient {
    url: String,
    api_token: Option<SecretString>,
    state: Arc<watch::Sender<StreamState>>,
    opened: Arc<AtomicBool>,
    events_tx: mpsc::UnboundedSender<Delivery>,
    events_rx: mpsc::UnboundedReceiver<Delivery>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    task: Option<JoinHandle<()>>,
    started: bool,
    finished: bool,
}

impl EventStreamClient {
    /// Client for the stream of `session_id` under `ws_base`.
    pub fn new(ws_base: &Url, session_id: &SessionId) -> Self {
        Self::for_url(format!(
            "{}/ws/generate/{}",
            ws_base.as_str().trim_end_matches('/'),
            session_id
        ))
    }

    /// Client for an explicit stream URL.
    pub fn for_url(url: impl Into<String>) -> Self {
        let (state, _) = watch::channel(StreamState::Idle);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            url: url.into(),
            api_token: None,
            state: Arc::new(state),
            opened: Arc::new(AtomicBool::new(false)),
            events_tx,
            events_rx,
            commands: None,
            task: None,
            started: false,
            finished: false,
        }
    }

    /// Send `Authorization: Bearer <token>` with the handshake.
    pub fn with_token(mut self, token: Option<SecretString>) -> Self {
        self.api_token = token;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == StreamState::Open
    }

    /// Start connecting in the background. Only the first call has an effect.
    pub fn connect(&mut self) {
        if !transition(&self.state, &[StreamState::Idle], StreamState::Connecting) {
            warn!(state = %self.state(), "connect called twice, ignoring");
            return;
        }

        let request = match self.handshake_request() {
            Ok(request) => request,
            Err(e) => {
                warn!(url = %self.url, error = %e, "cannot build stream handshake");
                let _ = self.events_tx.send(Delivery::Failed(Error::StreamTransport(
                    CONNECTION_ERROR_MESSAGE.to_string(),
                )));
                transition(
                    &self.state,
                    &[StreamState::Connecting],
                    StreamState::ClosedError,
                );
                return;
            }
        };

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        self.commands = Some(commands_tx);

        debug!(url = %self.url, "connecting event stream");
        let link = Link {
            state: Arc::clone(&self.state),
            opened: Arc::clone(&self.opened),
            events: self.events_tx.clone(),
            commands: commands_rx,
        };
        self.task = Some(tokio::spawn(
            link.drive(request).instrument(Span::current()),
        ));
    }

    /// Resolve once the stream has opened.
    ///
    /// Fails when the client was never connected or the transport failed
    /// before the handshake completed.
    pub async fn wait_open(&self) -> Result<()> {
        let mut updates = self.state.subscribe();
        let state = updates
            .wait_for(|s| *s != StreamState::Connecting)
            .await
            .map(|s| *s)
            .map_err(|_| Error::StreamTransport(CONNECTION_ERROR_MESSAGE.to_string()))?;

        if self.opened.load(Ordering::SeqCst) {
            return Ok(());
        }
        match state {
            StreamState::Idle => Err(Error::StreamTransport(NOT_CONNECTED_MESSAGE.to_string())),
            _ => Err(Error::StreamTransport(CONNECTION_ERROR_MESSAGE.to_string())),
        }
    }

    /// Send the `start` control frame.
    ///
    /// Sent at most once. Outside `Open` nothing is sent and the failure is
    /// reported through the event sequence instead of being returned.
    pub fn start(&mut self) {
        if self.started {
            warn!("start already sent for this session, ignoring");
            return;
        }

        let sent = self.is_open()
            && self
                .commands
                .as_ref()
                .is_some_and(|commands| commands.send(Command::Start).is_ok());

        if sent {
            self.started = true;
            debug!("start requested");
        } else {
            warn!(state = %self.state(), "start requested while stream is not open");
            let _ = self.events_tx.send(Delivery::Failed(Error::StreamTransport(
                NOT_CONNECTED_MESSAGE.to_string(),
            )));
        }
    }

    /// Next event in arrival order.
    ///
    /// Returns `None` once the session is over: after a terminal event, a
    /// transport failure, a transport close, or [`disconnect`](Self::disconnect).
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent>> {
        if self.finished {
            return None;
        }

        match self.events_rx.recv().await {
            Some(Delivery::Event(event)) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Some(Ok(event))
            }
            Some(Delivery::Failed(error)) => {
                self.finished = true;
                Some(Err(error))
            }
            Some(Delivery::Closed) | None => {
                self.finished = true;
                None
            }
        }
    }

    /// Dispatch every remaining event to `observer`, then call `on_close`.
    pub async fn observe<O: StreamObserver>(&mut self, observer: &mut O) {
        while let Some(delivery) = self.next_event().await {
            match delivery {
                Ok(StreamEvent::Ready { message }) => observer.on_ready(message.as_deref()),
                Ok(StreamEvent::Token { content, node }) => {
                    observer.on_token(&content, node.as_deref());
                }
                Ok(StreamEvent::NodeComplete { node, state }) => {
                    observer.on_node_complete(node.as_deref(), &state);
                }
                Ok(StreamEvent::Complete { message }) => observer.on_complete(message.as_deref()),
                Ok(StreamEvent::Error { message }) => observer.on_error(Error::Protocol(message)),
                Err(error) => observer.on_error(error),
            }
        }
        observer.on_close();
    }

    /// Close the stream. Nothing is delivered afterwards, including events
    /// already received. Safe to call any number of times.
    pub fn disconnect(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Close);
        }
        if !self.finished {
            self.finished = true;
            self.events_rx.close();
        }
        if transition(
            &self.state,
            &[StreamState::Idle, StreamState::Connecting, StreamState::Open],
            StreamState::Closed,
        ) {
            debug!(url = %self.url, "event stream disconnected");
        }
    }

    /// Wait for the background task to finish its close handshake.
    pub async fn closed(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn handshake_request(&self) -> Result<Request> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::StreamTransport(format!("invalid stream url {}: {e}", self.url)))?;
        if let Some(ref token) = self.api_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|e| Error::StreamTransport(format!("invalid auth header: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }
}

impl Drop for EventStreamClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Background half of a client: owns the socket.
struct Link {
    state: Arc<watch::Sender<StreamState>>,
    opened: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<Delivery>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl Link {
    async fn drive(mut self, request: Request) {
        let connected = tokio::select! {
            result = tokio_tungstenite::connect_async(request) => result,
            _ = self.commands.recv() => {
                transition(&self.state, &[StreamState::Connecting], StreamState::Closed);
                debug!("disconnected before the handshake finished");
                return;
            }
        };

        let mut ws = match connected {
            Ok((ws, _response)) => ws,
            Err(e) => {
                self.fail(&e);
                return;
            }
        };

        self.opened.store(true, Ordering::SeqCst);
        if !transition(&self.state, &[StreamState::Connecting], StreamState::Open) {
            // Disconnected while the handshake was in flight.
            let _ = ws.close(None).await;
            return;
        }
        info!("event stream open");

        let (mut sink, mut source) = ws.split();
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Start) => {
                        let frame = Message::Text(ControlFrame::Start.to_json());
                        if let Err(e) = sink.send(frame).await {
                            self.fail(&e);
                            return;
                        }
                        debug!("start frame sent");
                    }
                    Some(Command::Close) | None => {
                        let _ = sink.close().await;
                        transition(&self.state, &[StreamState::Open], StreamState::Closed);
                        return;
                    }
                },
                inbound = source.next() => match inbound {
                    Some(Ok(message)) => {
                        let Some(event) = decode_message(message) else {
                            continue;
                        };
                        metrics::stream_frames().add(1, &[KeyValue::new("kind", event.kind())]);
                        debug!(kind = event.kind(), "stream event");

                        let terminal = event.is_terminal();
                        let delivered = self.events.send(Delivery::Event(event)).is_ok();
                        if terminal || !delivered {
                            let _ = sink.close().await;
                            transition(&self.state, &[StreamState::Open], StreamState::Closed);
                            return;
                        }
                    }
                    Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                        info!("event stream closed by peer");
                        let _ = self.events.send(Delivery::Closed);
                        transition(&self.state, &[StreamState::Open], StreamState::Closed);
                        return;
                    }
                    Some(Err(e)) => {
                        self.fail(&e);
                        return;
                    }
                },
            }
        }
    }

    fn fail(&self, error: &WsError) {
        warn!(error = %error, "event stream transport failure");
        let _ = self.events.send(Delivery::Failed(Error::StreamTransport(
            CONNECTION_ERROR_MESSAGE.to_string(),
        )));
        transition(
            &self.state,
            &[StreamState::Connecting, StreamState::Open],
            StreamState::ClosedError,
        );
    }
}

/// Turn a socket message into an event, if it carries one.
fn decode_message(message: Message) -> Option<StreamEvent> {
    let text = match message {
        Message::Text(text) => text,
        Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => {
            return None;
        }
    };
    let event = decode_frame(&text);
    if event.is_none() {
        debug!(len = text.len(), "ignoring stream frame");
    }
    event
}

/// Move to `to` if the current state is one of `from`. Returns whether it moved.
fn transition(state: &watch::Sender<StreamState>, from: &[StreamState], to: StreamState) -> bool {
    state.send_if_modified(|current| {
        if from.contains(current) {
            *current = to;
            true
        } else {
            false
        }
    })
}

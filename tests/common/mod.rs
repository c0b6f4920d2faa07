//! Shared fixtures: an in-process generation backend.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// What the backend sends and when.
pub struct Script {
    /// Frames sent in order.
    pub frames: Vec<String>,
    /// Hold the frames back until the client sends its first text frame.
    pub wait_for_start: bool,
    /// Drop the TCP connection after the frames instead of waiting for the client.
    pub hang_up: bool,
}

impl Script {
    /// Frames sent after `start`, then wait for the client to close.
    pub fn after_start(frames: Vec<Value>) -> Self {
        Self {
            frames: frames.iter().map(Value::to_string).collect(),
            wait_for_start: true,
            hang_up: false,
        }
    }

    /// Raw text frames, optionally held until `start`.
    pub fn raw(frames: &[&str], wait_for_start: bool) -> Self {
        Self {
            frames: frames.iter().map(|f| f.to_string()).collect(),
            wait_for_start,
            hang_up: false,
        }
    }

    pub fn hang_up(mut self) -> Self {
        self.hang_up = true;
        self
    }
}

/// What the backend observed on its single connection.
#[derive(Debug, Default)]
pub struct Report {
    pub path: String,
    pub authorization: Option<String>,
    /// Text frames received from the client, in order.
    pub received: Vec<String>,
    /// The client closed the stream (close frame or EOF).
    pub closed_by_client: bool,
}

pub struct Backend {
    pub addr: SocketAddr,
    report: oneshot::Receiver<Report>,
}

impl Backend {
    pub fn ws_base(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Wait for the connection to end and return what was seen.
    pub async fn report(self) -> Report {
        tokio::time::timeout(Duration::from_secs(5), self.report)
            .await
            .expect("backend did not finish in time")
            .expect("backend task dropped its report")
    }
}

/// Accept one stream connection and play `script` on it.
pub async fn spawn_backend(script: Script) -> Backend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut report = Report::default();

        let mut path = String::new();
        let mut authorization = None;
        let capture = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            path = req.uri().path().to_string();
            authorization = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(socket, capture)
            .await
            .unwrap();
        report.path = path;
        report.authorization = authorization;

        if script.wait_for_start {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        report.received.push(text);
                        break;
                    }
                    Some(Ok(_)) => continue,
                    _ => {
                        report.closed_by_client = true;
                        let _ = tx.send(report);
                        return;
                    }
                }
            }
        }

        for frame in script.frames {
            if ws.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }

        if script.hang_up {
            drop(ws);
            let _ = tx.send(report);
            return;
        }

        while let Some(message) = ws.next().await {
            match message {
                Ok(Message::Text(text)) => report.received.push(text),
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        report.closed_by_client = true;
        let _ = tx.send(report);
    });

    Backend { addr, report: rx }
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

pub fn outline() -> String {
    [
        "**0:00-0:03 - Hook**",
        "Open on the alarm clock.",
        "**0:03-0:10 - Build**",
        "Three myths, one per cut.",
        "**0:10-0:15 - Payoff**",
        "Reveal the routine that works.",
    ]
    .join("\n")
}

pub fn idea() -> Value {
    json!({
        "title": "  Morning Routine Myths ",
        "hook": "\"Stop scrolling\"",
        "script_outline": outline(),
        "tags": ["fitness", "habits", 3],
        "estimated_length": "15s",
    })
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

//! WebSocket client for the agent control port.
//!
//! The client owns the connection: a reader task dispatches responses to
//! waiting callers and routes chat events to their runs, a writer task
//! serializes outbound frames. The agent starts the conversation with a
//! `connect.challenge` event; the reader answers it and resolves the shared
//! ready state that [`AgentClient::wait_ready`] observes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::envelope::{
    ChatEvent, ChatSendParams, ChatState, ConnectAck, ConnectParams, Envelope, EventFrame,
    RequestBody, RequestFrame, ResponseFrame, RunAccepted,
};

/// Errors from the agent client.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The WebSocket connection did not open in time.
    #[error("connection timed out after {0}ms")]
    ConnectTimeout(u64),
    /// The handshake did not complete in time.
    #[error("handshake timed out after {0}ms")]
    HandshakeTimeout(u64),
    /// The agent refused the connect request.
    #[error("agent rejected the connection: {0}")]
    HandshakeRejected(String),
    /// The connection is gone.
    #[error("connection closed")]
    ConnectionClosed,
    /// The agent refused a request.
    #[error("request rejected: {0}")]
    Rejected(String),
    /// A response payload did not have the expected shape.
    #[error("malformed {method} response payload")]
    MalformedPayload {
        /// The method whose response was malformed.
        method: &'static str,
    },
    /// A chat run ended with an error.
    #[error("run {run_id} failed: {message}")]
    RunFailed {
        /// The failed run.
        run_id: String,
        /// The agent's error message.
        message: String,
    },
    /// A chat run was cancelled before completing.
    #[error("run {run_id} aborted")]
    RunAborted {
        /// The aborted run.
        run_id: String,
    },
    /// Transport-level failure.
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    /// Frame (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration for [`AgentClient::connect`].
#[derive(Debug, Clone)]
pub struct AgentClientConfig {
    /// WebSocket URL of the agent control port.
    pub url: String,
    /// Shared secret sent in the connect request.
    pub token: String,
    /// Capabilities announced in the connect request.
    pub capabilities: Vec<String>,
    /// How long to wait for the socket to open.
    pub connect_timeout: Duration,
    /// How long [`AgentClient::wait_ready`] waits for the handshake.
    pub handshake_timeout: Duration,
}

impl Default for AgentClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:18789".to_string(),
            token: String::new(),
            capabilities: vec!["chat".to_string()],
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
enum ReadyState {
    Pending,
    Ready,
    Failed(String),
}

/// What the reader does with a response, keyed by request id.
enum PendingReply {
    /// Resolves the shared ready state.
    Handshake,
    /// `chat.send`: the reader opens the run channel before touching the
    /// next frame, so no event can slip past an unregistered run.
    ChatRun(oneshot::Sender<Result<OpenedRun, ResponseFrame>>),
}

struct OpenedRun {
    run_id: String,
    events: mpsc::UnboundedReceiver<ChatEvent>,
}

struct Shared {
    config: AgentClientConfig,
    outgoing: mpsc::UnboundedSender<Message>,
    pending: Mutex<HashMap<String, PendingReply>>,
    runs: Mutex<HashMap<String, mpsc::UnboundedSender<ChatEvent>>>,
    ready_tx: watch::Sender<ReadyState>,
}

impl Shared {
    fn send_frame(&self, frame: &Envelope) -> Result<(), ProtocolError> {
        let json = serde_json::to_string(frame)?;
        self.outgoing
            .send(Message::text(json))
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    fn resolve_handshake(&self, res: ResponseFrame) {
        if !res.ok {
            let message = res
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "connect rejected".to_string());
            self.ready_tx.send_replace(ReadyState::Failed(message));
            return;
        }
        let ack = res
            .payload
            .ok_or(())
            .and_then(|p| serde_json::from_value::<ConnectAck>(p).map_err(|_| ()));
        match ack {
            Ok(ConnectAck::HelloOk {}) => {
                info!("Agent handshake complete");
                self.ready_tx.send_replace(ReadyState::Ready);
            }
            Err(()) => {
                self.ready_tx.send_replace(ReadyState::Failed(
                    "connect response did not carry a hello-ok payload".to_string(),
                ));
            }
        }
    }
}

/// Client for one agent connection.
///
/// Cheap to share behind an [`Arc`]; all methods take `&self`.
pub struct AgentClient {
    shared: Arc<Shared>,
}

impl AgentClient {
    /// Open the WebSocket connection and start the reader and writer tasks.
    ///
    /// Returns as soon as the socket is up; the handshake completes in the
    /// background. Call [`AgentClient::wait_ready`] before sending.
    pub async fn connect(config: AgentClientConfig) -> Result<Self, ProtocolError> {
        let connect_timeout = config.connect_timeout;
        let (ws, _response) =
            tokio::time::timeout(connect_timeout, connect_async(config.url.as_str()))
                .await
                .map_err(|_| ProtocolError::ConnectTimeout(connect_timeout.as_millis() as u64))??;

        let (sink, stream) = ws.split();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (ready_tx, _) = watch::channel(ReadyState::Pending);

        let shared = Arc::new(Shared {
            config,
            outgoing: outgoing_tx,
            pending: Mutex::new(HashMap::new()),
            runs: Mutex::new(HashMap::new()),
            ready_tx,
        });

        tokio::spawn(write_loop(sink, outgoing_rx));
        tokio::spawn(read_loop(stream, shared.clone()));

        Ok(Self { shared })
    }

    /// Wait until the challenge/connect handshake has completed.
    pub async fn wait_ready(&self) -> Result<(), ProtocolError> {
        let timeout = self.shared.config.handshake_timeout;
        let mut rx = self.shared.ready_tx.subscribe();
        tokio::time::timeout(timeout, async move {
            loop {
                let state = rx.borrow_and_update().clone();
                match state {
                    ReadyState::Ready => return Ok(()),
                    ReadyState::Failed(message) => {
                        return Err(ProtocolError::HandshakeRejected(message));
                    }
                    ReadyState::Pending => {}
                }
                if rx.changed().await.is_err() {
                    return Err(ProtocolError::ConnectionClosed);
                }
            }
        })
        .await
        .map_err(|_| ProtocolError::HandshakeTimeout(timeout.as_millis() as u64))?
    }

    /// Whether the handshake has completed.
    pub fn is_ready(&self) -> bool {
        matches!(&*self.shared.ready_tx.borrow(), ReadyState::Ready)
    }

    /// Submit one chat message and get a handle on its streaming run.
    pub async fn send_chat(
        &self,
        session_key: &str,
        message: &str,
    ) -> Result<ChatTurn, ProtocolError> {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .await
            .insert(id.clone(), PendingReply::ChatRun(tx));

        let frame = Envelope::Req(RequestFrame {
            id: id.clone(),
            body: RequestBody::ChatSend(ChatSendParams {
                session_key: session_key.to_string(),
                message: message.to_string(),
                idempotency_key: Uuid::new_v4().to_string(),
            }),
        });
        if let Err(e) = self.shared.send_frame(&frame) {
            self.shared.pending.lock().await.remove(&id);
            return Err(e);
        }

        match rx.await {
            Ok(Ok(run)) => Ok(ChatTurn {
                run_id: run.run_id,
                events: run.events,
                seen: String::new(),
                done: false,
            }),
            Ok(Err(res)) if res.ok => Err(ProtocolError::MalformedPayload {
                method: "chat.send",
            }),
            Ok(Err(res)) => Err(ProtocolError::Rejected(
                res.error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "request rejected".to_string()),
            )),
            Err(_) => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Send a close frame; teardown completes cooperatively.
    pub fn close(&self) {
        let _ = self.shared.outgoing.send(Message::Close(None));
    }
}

impl Drop for AgentClient {
    fn drop(&mut self) {
        let _ = self.shared.outgoing.send(Message::Close(None));
    }
}

/// One streaming chat run.
///
/// Yields newly produced text fragments until the run reaches a terminal
/// state. The agent sends cumulative snapshots; the turn tracks what it has
/// already yielded and emits only the new suffix.
#[derive(Debug)]
pub struct ChatTurn {
    run_id: String,
    events: mpsc::UnboundedReceiver<ChatEvent>,
    seen: String,
    done: bool,
}

impl ChatTurn {
    /// The server-issued id of this run.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The next new text fragment, or `None` once the run completed.
    ///
    /// A failed or aborted run surfaces as an error exactly once; the turn
    /// is closed afterwards.
    pub async fn next_delta(&mut self) -> Result<Option<String>, ProtocolError> {
        loop {
            if self.done {
                return Ok(None);
            }
            let event = match self.events.recv().await {
                Some(event) => event,
                None => {
                    self.done = true;
                    return Err(ProtocolError::ConnectionClosed);
                }
            };
            match event.state {
                ChatState::Delta => {
                    let fragment = self.absorb(event.text.unwrap_or_default());
                    if fragment.is_empty() {
                        continue;
                    }
                    return Ok(Some(fragment));
                }
                ChatState::Final => {
                    self.done = true;
                    let fragment = match event.text {
                        Some(text) => self.absorb(text),
                        None => String::new(),
                    };
                    if fragment.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(fragment));
                }
                ChatState::Error => {
                    self.done = true;
                    return Err(ProtocolError::RunFailed {
                        run_id: self.run_id.clone(),
                        message: event
                            .text
                            .unwrap_or_else(|| "agent reported an error".to_string()),
                    });
                }
                ChatState::Aborted => {
                    self.done = true;
                    return Err(ProtocolError::RunAborted {
                        run_id: self.run_id.clone(),
                    });
                }
            }
        }
    }

    /// Fold a cumulative snapshot into the seen text, returning the fresh
    /// part. A snapshot that does not extend the seen text replaces it and
    /// is yielded whole.
    fn absorb(&mut self, snapshot: String) -> String {
        let fragment = match snapshot.strip_prefix(self.seen.as_str()) {
            Some(suffix) => suffix.to_string(),
            None => snapshot.clone(),
        };
        self.seen = snapshot;
        fragment
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = outgoing.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            warn!(error = %e, "WebSocket send failed");
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(
    mut stream: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    shared: Arc<Shared>,
) {
    while let Some(item) = stream.next().await {
        let message = match item {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "WebSocket read failed");
                break;
            }
        };
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match serde_json::from_str::<Envelope>(text.as_str()) {
            Ok(frame) => handle_frame(&shared, frame).await,
            Err(e) => warn!(error = %e, "Dropping malformed frame"),
        }
    }

    shared
        .ready_tx
        .send_replace(ReadyState::Failed("connection closed".to_string()));
    shared.pending.lock().await.clear();
    shared.runs.lock().await.clear();
    debug!("Agent connection reader stopped");
}

async fn handle_frame(shared: &Arc<Shared>, frame: Envelope) {
    match frame {
        Envelope::Event(EventFrame::ConnectChallenge(_)) => {
            let id = Uuid::new_v4().to_string();
            shared
                .pending
                .lock()
                .await
                .insert(id.clone(), PendingReply::Handshake);
            let frame = Envelope::Req(RequestFrame {
                id,
                body: RequestBody::Connect(ConnectParams {
                    token: shared.config.token.clone(),
                    capabilities: shared.config.capabilities.clone(),
                }),
            });
            if let Err(e) = shared.send_frame(&frame) {
                warn!(error = %e, "Failed to answer connect challenge");
            }
        }
        Envelope::Event(EventFrame::Chat(event)) => {
            let run_id = event.run_id.clone();
            let terminal = matches!(
                event.state,
                ChatState::Final | ChatState::Error | ChatState::Aborted
            );
            let mut runs = shared.runs.lock().await;
            match runs.get(&run_id) {
                Some(tx) => {
                    if tx.send(event).is_err() || terminal {
                        runs.remove(&run_id);
                    }
                }
                None => debug!(run_id = %run_id, "Dropping chat event for unknown run"),
            }
        }
        Envelope::Res(res) => {
            let entry = shared.pending.lock().await.remove(&res.id);
            match entry {
                Some(PendingReply::Handshake) => shared.resolve_handshake(res),
                Some(PendingReply::ChatRun(tx)) => {
                    let _ = tx.send(open_run(shared, res).await);
                }
                None => debug!(id = %res.id, "Dropping response with no waiting caller"),
            }
        }
        Envelope::Req(req) => {
            debug!(id = %req.id, "Ignoring request frame from agent");
        }
    }
}

async fn open_run(shared: &Arc<Shared>, res: ResponseFrame) -> Result<OpenedRun, ResponseFrame> {
    if !res.ok {
        return Err(res);
    }
    let Some(payload) = res.payload.clone() else {
        return Err(res);
    };
    let Ok(run) = serde_json::from_value::<RunAccepted>(payload) else {
        return Err(res);
    };
    let (tx, events) = mpsc::unbounded_channel();
    shared.runs.lock().await.insert(run.run_id.clone(), tx);
    Ok(OpenedRun {
        run_id: run.run_id,
        events,
    })
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for the bridge integration tests.
//!
//! Provides a scripted agent endpoint that serves real [`AgentClient`]
//! connections, a store over a temp database, and a wiremock callback
//! endpoint that records every push.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use roost_core::store::SqliteStore;
use roost_protocol::client::{AgentClient, AgentClientConfig};
use roost_protocol::envelope::{
    ChallengeInfo, ChatEvent, ChatState, ConnectAck, Envelope, ErrorBody, EventFrame,
    RequestBody, RequestFrame, ResponseFrame,
};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

type AgentWs = WebSocketStream<TcpStream>;

/// One scripted answer to a chat request.
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    /// Cumulative snapshots to stream; the last one is the final text.
    /// An empty slice completes the run without producing any text.
    Stream(&'static [&'static str]),
    /// Refuse the chat request outright.
    Refuse(&'static str),
}

/// Message payloads the scripted agent received, in arrival order.
pub type Received = Arc<Mutex<Vec<String>>>;

/// Serve one client connection: handshake, then one scripted reply per
/// chat request. Leftover script entries are fine; the agent just waits
/// for the client to hang up once requests stop coming.
pub async fn serving_agent(script: Vec<Reply>) -> (String, Received, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let log = received.clone();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        complete_handshake(&mut ws).await;

        for (index, reply) in script.into_iter().enumerate() {
            let Some(req) = next_request(&mut ws).await else {
                return;
            };
            let RequestBody::ChatSend(params) = &req.body else {
                panic!("expected a chat.send request, got {:?}", req.body);
            };
            log.lock().await.push(params.message.clone());

            match reply {
                Reply::Stream(snapshots) => {
                    let run_id = format!("run-{index}");
                    send_frame(
                        &mut ws,
                        &Envelope::Res(ResponseFrame {
                            id: req.id,
                            ok: true,
                            payload: Some(serde_json::json!({ "runId": run_id })),
                            error: None,
                        }),
                    )
                    .await;
                    stream_snapshots(&mut ws, &run_id, snapshots).await;
                }
                Reply::Refuse(message) => {
                    send_frame(
                        &mut ws,
                        &Envelope::Res(ResponseFrame {
                            id: req.id,
                            ok: false,
                            payload: None,
                            error: Some(ErrorBody {
                                code: "agent_busy".to_string(),
                                message: message.to_string(),
                            }),
                        }),
                    )
                    .await;
                }
            }
        }

        wait_for_close(&mut ws).await;
    });

    (format!("ws://{addr}"), received, handle)
}

/// Connect a ready client to a scripted agent.
pub async fn connected_client(url: String) -> AgentClient {
    let client = AgentClient::connect(AgentClientConfig {
        url,
        token: "agent-secret".to_string(),
        connect_timeout: Duration::from_secs(5),
        handshake_timeout: Duration::from_secs(5),
        ..AgentClientConfig::default()
    })
    .await
    .unwrap();
    client.wait_ready().await.unwrap();
    client
}

async fn send_frame(ws: &mut AgentWs, frame: &Envelope) {
    let json = serde_json::to_string(frame).unwrap();
    ws.send(Message::text(json)).await.unwrap();
}

/// Next request frame, or `None` once the client hangs up.
async fn next_request(ws: &mut AgentWs) -> Option<RequestFrame> {
    loop {
        match ws.next().await? {
            Ok(Message::Text(text)) => {
                if let Envelope::Req(req) = serde_json::from_str(text.as_str()).unwrap() {
                    return Some(req);
                }
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            _ => {}
        }
    }
}

async fn complete_handshake(ws: &mut AgentWs) {
    send_frame(
        ws,
        &Envelope::Event(EventFrame::ConnectChallenge(ChallengeInfo { nonce: None })),
    )
    .await;
    let req = next_request(ws).await.expect("connect request");
    let RequestBody::Connect(_) = req.body else {
        panic!("expected a connect request, got {:?}", req.body);
    };
    send_frame(
        ws,
        &Envelope::Res(ResponseFrame {
            id: req.id,
            ok: true,
            payload: Some(serde_json::to_value(ConnectAck::HelloOk {}).unwrap()),
            error: None,
        }),
    )
    .await;
}

async fn stream_snapshots(ws: &mut AgentWs, run_id: &str, snapshots: &[&str]) {
    if snapshots.is_empty() {
        send_chat_event(ws, run_id, ChatState::Final, None).await;
        return;
    }
    let (last, partials) = snapshots.split_last().unwrap();
    for snapshot in partials {
        send_chat_event(ws, run_id, ChatState::Delta, Some(snapshot)).await;
    }
    send_chat_event(ws, run_id, ChatState::Final, Some(last)).await;
}

async fn send_chat_event(ws: &mut AgentWs, run_id: &str, state: ChatState, text: Option<&str>) {
    send_frame(
        ws,
        &Envelope::Event(EventFrame::Chat(ChatEvent {
            run_id: run_id.to_string(),
            state,
            text: text.map(str::to_string),
        })),
    )
    .await;
}

async fn wait_for_close(ws: &mut AgentWs) {
    while let Some(item) = ws.next().await {
        if matches!(item, Ok(Message::Close(_)) | Err(_)) {
            break;
        }
    }
}

/// Store over a fresh temp database. Keep the tempdir alive for the
/// duration of the test.
pub async fn test_store() -> (Arc<SqliteStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("state.db");
    let store = SqliteStore::from_path(db_path.to_str().expect("utf8 path"))
        .await
        .expect("open store");
    (Arc::new(store), dir)
}

/// A callback endpoint that accepts every connection push.
pub async fn accepting_callbacks() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex("^/connections/.+$"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

/// All push bodies the callback endpoint received for `connection_id`.
pub async fn pushes_for(server: &MockServer, connection_id: &str) -> Vec<serde_json::Value> {
    let suffix = format!("/connections/{connection_id}");
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path().ends_with(&suffix))
        .map(|request| request.body_json::<serde_json::Value>().unwrap())
        .collect()
}
// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Client tests for roost-protocol against a scripted in-process agent.

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use roost_protocol::client::{AgentClient, AgentClientConfig, ProtocolError};
use roost_protocol::envelope::{
    ChallengeInfo, ChatEvent, ChatState, ConnectAck, Envelope, ErrorBody, EventFrame,
    RequestBody, RequestFrame, ResponseFrame,
};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

type AgentWs = WebSocketStream<TcpStream>;

/// Accept exactly one connection and run `script` over it. The returned
/// handle propagates assertion failures from inside the script.
async fn scripted_agent<F, Fut>(script: F) -> (String, JoinHandle<()>)
where
    F: FnOnce(AgentWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        script(ws).await;
    });
    (format!("ws://{addr}"), handle)
}

fn test_config(url: String) -> AgentClientConfig {
    AgentClientConfig {
        url,
        token: "agent-secret".to_string(),
        connect_timeout: Duration::from_secs(5),
        handshake_timeout: Duration::from_secs(5),
        ..AgentClientConfig::default()
    }
}

async fn send_frame(ws: &mut AgentWs, frame: &Envelope) {
    let json = serde_json::to_string(frame).unwrap();
    ws.send(Message::text(json)).await.unwrap();
}

/// Read frames until the next request, skipping anything else.
async fn recv_request(ws: &mut AgentWs) -> RequestFrame {
    loop {
        let message = ws
            .next()
            .await
            .expect("connection stayed open")
            .expect("readable frame");
        match message {
            Message::Text(text) => {
                if let Envelope::Req(req) = serde_json::from_str(text.as_str()).unwrap() {
                    return req;
                }
            }
            Message::Close(_) => panic!("connection closed while awaiting a request"),
            _ => {}
        }
    }
}

/// Issue the challenge, check the connect request, acknowledge it.
async fn complete_handshake(ws: &mut AgentWs) {
    send_frame(
        ws,
        &Envelope::Event(EventFrame::ConnectChallenge(ChallengeInfo { nonce: None })),
    )
    .await;
    let req = recv_request(ws).await;
    let RequestBody::Connect(params) = req.body else {
        panic!("expected a connect request, got {:?}", req.body);
    };
    assert_eq!(params.token, "agent-secret");
    assert!(params.capabilities.contains(&"chat".to_string()));
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

/// Accept the chat.send request and open a run with the given id.
async fn accept_chat(ws: &mut AgentWs, run_id: &str) -> String {
    let req = recv_request(ws).await;
    let RequestBody::ChatSend(params) = &req.body else {
        panic!("expected a chat.send request, got {:?}", req.body);
    };
    assert!(!params.idempotency_key.is_empty());
    let message = params.message.clone();
    send_frame(
        ws,
        &Envelope::Res(ResponseFrame {
            id: req.id,
            ok: true,
            payload: Some(serde_json::json!({ "runId": run_id })),
            error: None,
        }),
    )
    .await;
    message
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

/// Drain frames until the client closes its side.
async fn wait_for_close(ws: &mut AgentWs) {
    while let Some(item) = ws.next().await {
        if matches!(item, Ok(Message::Close(_)) | Err(_)) {
            break;
        }
    }
}

#[tokio::test]
async fn test_handshake_completes() {
    let (url, agent) = scripted_agent(|mut ws| async move {
        complete_handshake(&mut ws).await;
        wait_for_close(&mut ws).await;
    })
    .await;

    let client = AgentClient::connect(test_config(url)).await.unwrap();
    client.wait_ready().await.unwrap();
    assert!(client.is_ready());

    client.close();
    agent.await.unwrap();
}

#[tokio::test]
async fn test_handshake_rejected() {
    let (url, agent) = scripted_agent(|mut ws| async move {
        send_frame(
            &mut ws,
            &Envelope::Event(EventFrame::ConnectChallenge(ChallengeInfo { nonce: None })),
        )
        .await;
        let req = recv_request(&mut ws).await;
        send_frame(
            &mut ws,
            &Envelope::Res(ResponseFrame {
                id: req.id,
                ok: false,
                payload: None,
                error: Some(ErrorBody {
                    code: "auth".to_string(),
                    message: "bad token".to_string(),
                }),
            }),
        )
        .await;
        wait_for_close(&mut ws).await;
    })
    .await;

    let client = AgentClient::connect(test_config(url)).await.unwrap();
    let err = client.wait_ready().await.unwrap_err();
    match err {
        ProtocolError::HandshakeRejected(message) => assert_eq!(message, "bad token"),
        other => panic!("expected a handshake rejection, got {other}"),
    }
    assert!(!client.is_ready());

    client.close();
    agent.await.unwrap();
}

#[tokio::test]
async fn test_handshake_requires_hello_ok_payload() {
    let (url, agent) = scripted_agent(|mut ws| async move {
        send_frame(
            &mut ws,
            &Envelope::Event(EventFrame::ConnectChallenge(ChallengeInfo { nonce: None })),
        )
        .await;
        let req = recv_request(&mut ws).await;
        send_frame(
            &mut ws,
            &Envelope::Res(ResponseFrame {
                id: req.id,
                ok: true,
                payload: Some(serde_json::json!({ "type": "hello" })),
                error: None,
            }),
        )
        .await;
        wait_for_close(&mut ws).await;
    })
    .await;

    let client = AgentClient::connect(test_config(url)).await.unwrap();
    let err = client.wait_ready().await.unwrap_err();
    assert!(matches!(err, ProtocolError::HandshakeRejected(_)));

    client.close();
    agent.await.unwrap();
}

#[tokio::test]
async fn test_chat_turn_yields_new_suffixes() {
    let (url, agent) = scripted_agent(|mut ws| async move {
        complete_handshake(&mut ws).await;
        let message = accept_chat(&mut ws, "run-1").await;
        assert_eq!(message, "hi there");
        // Cumulative snapshots; a repeat must not produce an empty fragment.
        send_chat_event(&mut ws, "run-1", ChatState::Delta, Some("Hel")).await;
        send_chat_event(&mut ws, "run-1", ChatState::Delta, Some("Hello")).await;
        send_chat_event(&mut ws, "run-1", ChatState::Delta, Some("Hello")).await;
        send_chat_event(&mut ws, "run-1", ChatState::Delta, Some("Hello wor")).await;
        send_chat_event(&mut ws, "run-1", ChatState::Final, Some("Hello world")).await;
        wait_for_close(&mut ws).await;
    })
    .await;

    let client = AgentClient::connect(test_config(url)).await.unwrap();
    client.wait_ready().await.unwrap();

    let mut turn = client.send_chat("user-1", "hi there").await.unwrap();
    assert_eq!(turn.run_id(), "run-1");

    let mut fragments = Vec::new();
    while let Some(fragment) = turn.next_delta().await.unwrap() {
        fragments.push(fragment);
    }
    assert_eq!(fragments, vec!["Hel", "lo", " wor", "ld"]);
    assert_eq!(fragments.concat(), "Hello world");

    // The turn stays closed.
    assert_eq!(turn.next_delta().await.unwrap(), None);

    client.close();
    agent.await.unwrap();
}

#[tokio::test]
async fn test_non_extending_snapshot_is_yielded_whole() {
    let (url, agent) = scripted_agent(|mut ws| async move {
        complete_handshake(&mut ws).await;
        accept_chat(&mut ws, "run-1").await;
        send_chat_event(&mut ws, "run-1", ChatState::Delta, Some("first try")).await;
        send_chat_event(&mut ws, "run-1", ChatState::Delta, Some("second answer")).await;
        send_chat_event(&mut ws, "run-1", ChatState::Final, None).await;
        wait_for_close(&mut ws).await;
    })
    .await;

    let client = AgentClient::connect(test_config(url)).await.unwrap();
    client.wait_ready().await.unwrap();

    let mut turn = client.send_chat("user-1", "hi").await.unwrap();
    assert_eq!(turn.next_delta().await.unwrap(), Some("first try".to_string()));
    assert_eq!(
        turn.next_delta().await.unwrap(),
        Some("second answer".to_string())
    );
    assert_eq!(turn.next_delta().await.unwrap(), None);

    client.close();
    agent.await.unwrap();
}

#[tokio::test]
async fn test_run_error_surfaces_once() {
    let (url, agent) = scripted_agent(|mut ws| async move {
        complete_handshake(&mut ws).await;
        accept_chat(&mut ws, "run-1").await;
        send_chat_event(&mut ws, "run-1", ChatState::Delta, Some("partial")).await;
        send_chat_event(&mut ws, "run-1", ChatState::Error, Some("model overloaded")).await;
        wait_for_close(&mut ws).await;
    })
    .await;

    let client = AgentClient::connect(test_config(url)).await.unwrap();
    client.wait_ready().await.unwrap();

    let mut turn = client.send_chat("user-1", "hi").await.unwrap();
    assert_eq!(turn.next_delta().await.unwrap(), Some("partial".to_string()));
    match turn.next_delta().await.unwrap_err() {
        ProtocolError::RunFailed { run_id, message } => {
            assert_eq!(run_id, "run-1");
            assert_eq!(message, "model overloaded");
        }
        other => panic!("expected a run failure, got {other}"),
    }
    // Closed after the error, not erroring again.
    assert_eq!(turn.next_delta().await.unwrap(), None);

    client.close();
    agent.await.unwrap();
}

#[tokio::test]
async fn test_aborted_run_surfaces_as_error() {
    let (url, agent) = scripted_agent(|mut ws| async move {
        complete_handshake(&mut ws).await;
        accept_chat(&mut ws, "run-1").await;
        send_chat_event(&mut ws, "run-1", ChatState::Aborted, None).await;
        wait_for_close(&mut ws).await;
    })
    .await;

    let client = AgentClient::connect(test_config(url)).await.unwrap();
    client.wait_ready().await.unwrap();

    let mut turn = client.send_chat("user-1", "hi").await.unwrap();
    assert!(matches!(
        turn.next_delta().await.unwrap_err(),
        ProtocolError::RunAborted { .. }
    ));

    client.close();
    agent.await.unwrap();
}

#[tokio::test]
async fn test_rejected_chat_send() {
    let (url, agent) = scripted_agent(|mut ws| async move {
        complete_handshake(&mut ws).await;
        let req = recv_request(&mut ws).await;
        send_frame(
            &mut ws,
            &Envelope::Res(ResponseFrame {
                id: req.id,
                ok: false,
                payload: None,
                error: Some(ErrorBody {
                    code: "busy".to_string(),
                    message: "another run is active".to_string(),
                }),
            }),
        )
        .await;
        wait_for_close(&mut ws).await;
    })
    .await;

    let client = AgentClient::connect(test_config(url)).await.unwrap();
    client.wait_ready().await.unwrap();

    let err = client.send_chat("user-1", "hi").await.unwrap_err();
    match err {
        ProtocolError::Rejected(message) => assert_eq!(message, "another run is active"),
        other => panic!("expected a rejection, got {other}"),
    }

    client.close();
    agent.await.unwrap();
}

#[tokio::test]
async fn test_accepted_run_without_run_id_is_malformed() {
    let (url, agent) = scripted_agent(|mut ws| async move {
        complete_handshake(&mut ws).await;
        let req = recv_request(&mut ws).await;
        send_frame(
            &mut ws,
            &Envelope::Res(ResponseFrame {
                id: req.id,
                ok: true,
                payload: Some(serde_json::json!({ "accepted": true })),
                error: None,
            }),
        )
        .await;
        wait_for_close(&mut ws).await;
    })
    .await;

    let client = AgentClient::connect(test_config(url)).await.unwrap();
    client.wait_ready().await.unwrap();

    let err = client.send_chat("user-1", "hi").await.unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::MalformedPayload { method: "chat.send" }
    ));

    client.close();
    agent.await.unwrap();
}

#[tokio::test]
async fn test_concurrent_runs_route_by_run_id() {
    let (url, agent) = scripted_agent(|mut ws| async move {
        complete_handshake(&mut ws).await;
        // Both requests arrive before any events flow. Answer each with its
        // own run id, keyed off the message so ordering does not matter.
        for _ in 0..2 {
            let req = recv_request(&mut ws).await;
            let RequestBody::ChatSend(params) = &req.body else {
                panic!("expected a chat.send request");
            };
            let run_id = if params.message == "first" { "run-a" } else { "run-b" };
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
        }
        send_chat_event(&mut ws, "run-a", ChatState::Delta, Some("alpha")).await;
        send_chat_event(&mut ws, "run-b", ChatState::Delta, Some("beta")).await;
        send_chat_event(&mut ws, "run-b", ChatState::Final, Some("beta done")).await;
        send_chat_event(&mut ws, "run-a", ChatState::Final, Some("alpha done")).await;
        wait_for_close(&mut ws).await;
    })
    .await;

    let client = AgentClient::connect(test_config(url)).await.unwrap();
    client.wait_ready().await.unwrap();

    let (first, second) = tokio::join!(
        client.send_chat("user-1", "first"),
        client.send_chat("user-1", "second")
    );
    let mut first = first.unwrap();
    let mut second = second.unwrap();
    assert_eq!(first.run_id(), "run-a");
    assert_eq!(second.run_id(), "run-b");

    let mut first_text = String::new();
    while let Some(fragment) = first.next_delta().await.unwrap() {
        first_text.push_str(&fragment);
    }
    let mut second_text = String::new();
    while let Some(fragment) = second.next_delta().await.unwrap() {
        second_text.push_str(&fragment);
    }
    assert_eq!(first_text, "alpha done");
    assert_eq!(second_text, "beta done");

    client.close();
    agent.await.unwrap();
}

#[tokio::test]
async fn test_events_for_unknown_runs_are_dropped() {
    let (url, agent) = scripted_agent(|mut ws| async move {
        complete_handshake(&mut ws).await;
        // A stray event must not derail the session.
        send_chat_event(&mut ws, "ghost", ChatState::Delta, Some("boo")).await;
        accept_chat(&mut ws, "run-1").await;
        send_chat_event(&mut ws, "run-1", ChatState::Final, Some("ok")).await;
        wait_for_close(&mut ws).await;
    })
    .await;

    let client = AgentClient::connect(test_config(url)).await.unwrap();
    client.wait_ready().await.unwrap();

    let mut turn = client.send_chat("user-1", "hi").await.unwrap();
    assert_eq!(turn.next_delta().await.unwrap(), Some("ok".to_string()));
    assert_eq!(turn.next_delta().await.unwrap(), None);

    client.close();
    agent.await.unwrap();
}

#[tokio::test]
async fn test_malformed_frames_are_skipped() {
    let (url, agent) = scripted_agent(|mut ws| async move {
        ws.send(Message::text("not json at all")).await.unwrap();
        ws.send(Message::text(r#"{"type":"mystery"}"#)).await.unwrap();
        complete_handshake(&mut ws).await;
        wait_for_close(&mut ws).await;
    })
    .await;

    let client = AgentClient::connect(test_config(url)).await.unwrap();
    client.wait_ready().await.unwrap();

    client.close();
    agent.await.unwrap();
}

#[tokio::test]
async fn test_response_with_unknown_id_is_ignored() {
    let (url, agent) = scripted_agent(|mut ws| async move {
        send_frame(
            &mut ws,
            &Envelope::Res(ResponseFrame {
                id: "never-sent".to_string(),
                ok: true,
                payload: None,
                error: None,
            }),
        )
        .await;
        complete_handshake(&mut ws).await;
        wait_for_close(&mut ws).await;
    })
    .await;

    let client = AgentClient::connect(test_config(url)).await.unwrap();
    client.wait_ready().await.unwrap();

    client.close();
    agent.await.unwrap();
}

#[tokio::test]
async fn test_server_disconnect_fails_open_turns() {
    let (url, agent) = scripted_agent(|mut ws| async move {
        complete_handshake(&mut ws).await;
        accept_chat(&mut ws, "run-1").await;
        send_chat_event(&mut ws, "run-1", ChatState::Delta, Some("par")).await;
        ws.close(None).await.unwrap();
    })
    .await;

    let client = AgentClient::connect(test_config(url)).await.unwrap();
    client.wait_ready().await.unwrap();

    let mut turn = client.send_chat("user-1", "hi").await.unwrap();
    assert_eq!(turn.next_delta().await.unwrap(), Some("par".to_string()));
    assert!(matches!(
        turn.next_delta().await.unwrap_err(),
        ProtocolError::ConnectionClosed
    ));
    agent.await.unwrap();
}

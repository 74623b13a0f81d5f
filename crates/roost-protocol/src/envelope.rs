// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

//! JSON envelope frames exchanged with the agent control port.
//!
//! Every frame on the wire is one of three envelopes: a request (client to
//! agent), a response (agent to client, correlated by id), or an event
//! (agent to client, uncorrelated). Methods, events, and chat run states are
//! closed sets; a frame carrying an unknown tag fails to parse rather than
//! being silently accepted.

use serde::{Deserialize, Serialize};

/// Top-level wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// Client-initiated request.
    Req(RequestFrame),
    /// Agent response to a request.
    Res(ResponseFrame),
    /// Agent-initiated event.
    Event(EventFrame),
}

/// A request frame: correlation id plus method and parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Correlation id echoed back on the response.
    pub id: String,
    /// Method and its typed parameters.
    #[serde(flatten)]
    pub body: RequestBody,
}

/// The methods this client speaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "lowercase")]
pub enum RequestBody {
    /// Authenticate after the server's challenge.
    Connect(ConnectParams),
    /// Submit one chat message for processing.
    #[serde(rename = "chat.send")]
    ChatSend(ChatSendParams),
}

/// Parameters of the `connect` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Shared secret the agent expects.
    pub token: String,
    /// Capabilities this client wants to use.
    pub capabilities: Vec<String>,
}

/// Parameters of the `chat.send` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendParams {
    /// Conversation/session the message belongs to.
    pub session_key: String,
    /// The message text.
    pub message: String,
    /// Client-generated key so retried sends are not double-processed.
    pub idempotency_key: String,
}

/// A response frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Correlation id of the request being answered.
    pub id: String,
    /// Whether the request succeeded.
    pub ok: bool,
    /// Success payload; shape depends on the method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Failure details when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Error details carried on a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code, when the agent provides one.
    #[serde(default)]
    pub code: String,
    /// Readable description of the failure.
    pub message: String,
}

/// The events this client understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "lowercase")]
pub enum EventFrame {
    /// First frame after the socket opens; the client answers with
    /// [`RequestBody::Connect`].
    #[serde(rename = "connect.challenge")]
    ConnectChallenge(ChallengeInfo),
    /// Streaming update for a chat run.
    Chat(ChatEvent),
}

/// Payload of the connect challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeInfo {
    /// Opaque server nonce; the connect request does not echo it.
    #[serde(default)]
    pub nonce: Option<String>,
}

/// One streaming update for a chat run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    /// The run the update belongs to.
    pub run_id: String,
    /// What kind of update this is.
    pub state: ChatState,
    /// Cumulative text snapshot (deltas and final); error message otherwise.
    #[serde(default)]
    pub text: Option<String>,
}

/// Lifecycle state of a chat event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatState {
    /// More text was produced; `text` holds the cumulative snapshot.
    Delta,
    /// The run completed.
    Final,
    /// The run failed.
    Error,
    /// The run was cancelled before completing.
    Aborted,
}

/// Payload of a successful `connect` response.
///
/// Modeled as a one-variant tagged enum so an unexpected payload type is a
/// parse error, not a silently accepted handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConnectAck {
    /// Agent accepted the connection.
    #[serde(rename = "hello-ok")]
    HelloOk {},
}

/// Payload of a successful `chat.send` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAccepted {
    /// Server-issued id for the run the message started.
    pub run_id: String,
}

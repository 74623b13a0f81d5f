// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event push to the callback endpoint.
//!
//! Stream chunks, stream ends, and errors travel from the instance back to
//! whatever transport edge holds the caller's connection. The edge owns the
//! connection registry; the bridge only POSTs events at it.

use std::time::Duration;

use roost_core::model::ServerMessage;
use thiserror::Error;
use tracing::debug;

/// Bound on one callback push.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from a callback push.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// The endpoint answered with a non-success status.
    #[error("Callback endpoint returned {0}")]
    Status(u16),

    /// The request never completed (refused, unreachable, timed out).
    #[error("Callback request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// HTTP client pushing `ServerMessage` events to the callback endpoint.
#[derive(Debug, Clone)]
pub struct CallbackSender {
    http: reqwest::Client,
    base_url: String,
}

impl CallbackSender {
    /// Create a sender with the standard timeout.
    pub fn new(base_url: &str) -> Result<Self, CallbackError> {
        Self::with_timeout(base_url, CALLBACK_TIMEOUT)
    }

    /// Create a sender with an explicit timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, CallbackError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Push one event at the connection.
    ///
    /// A 404 or 410 means the connection is gone, the caller hung up while
    /// the agent was still talking. That is not an error worth surfacing.
    pub async fn push(
        &self,
        connection_id: &str,
        message: &ServerMessage,
    ) -> Result<(), CallbackError> {
        let url = format!("{}/connections/{}", self.base_url, connection_id);
        let response = self.http.post(&url).json(message).send().await?;

        let status = response.status().as_u16();
        if status == 404 || status == 410 {
            debug!(connection_id = %connection_id, status, "Connection gone, event dropped");
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(CallbackError::Status(status));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_push_posts_tagged_event_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/connections/conn-1"))
            .and(body_json(serde_json::json!({
                "type": "stream_chunk",
                "content": "On it"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sender = CallbackSender::new(&server.uri()).unwrap();
        sender
            .push(
                "conn-1",
                &ServerMessage::StreamChunk {
                    content: "On it".to_string(),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_push_to_gone_connection_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/connections/conn-1"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let sender = CallbackSender::new(&server.uri()).unwrap();
        sender.push("conn-1", &ServerMessage::StreamEnd).await.unwrap();
    }

    #[tokio::test]
    async fn test_push_to_unknown_connection_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/connections/conn-9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let sender = CallbackSender::new(&server.uri()).unwrap();
        sender.push("conn-9", &ServerMessage::StreamEnd).await.unwrap();
    }

    #[tokio::test]
    async fn test_push_failure_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/connections/conn-1"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sender = CallbackSender::new(&server.uri()).unwrap();
        let err = sender
            .push(
                "conn-1",
                &ServerMessage::Error {
                    error: "agent crashed".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CallbackError::Status(500)));
    }
}

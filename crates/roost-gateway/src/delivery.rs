// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Direct delivery to a running bridge.
//!
//! One bounded POST to the bridge's instance-local HTTP surface. Any
//! failure here is transient by definition; the router falls back to the
//! pending queue and never surfaces delivery errors to the caller.

use std::time::Duration;

use roost_core::model::{BRIDGE_PORT, BridgeMessage};
use thiserror::Error;
use tracing::debug;

/// Bound on one direct delivery attempt.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors from a delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The bridge answered with a non-success status.
    #[error("Bridge returned {0}")]
    Status(u16),

    /// The request never completed (refused, unreachable, timed out).
    #[error("Bridge request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// HTTP client for the bridge's `/message` endpoint.
#[derive(Debug, Clone)]
pub struct BridgeDelivery {
    http: reqwest::Client,
    auth_token: String,
    bridge_port: u16,
}

impl BridgeDelivery {
    /// Create a delivery client with the standard port and timeout.
    pub fn new(auth_token: &str) -> Result<Self, DeliveryError> {
        Self::with_options(auth_token, BRIDGE_PORT, DELIVERY_TIMEOUT)
    }

    /// Create a delivery client with explicit port and timeout.
    pub fn with_options(
        auth_token: &str,
        bridge_port: u16,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            auth_token: auth_token.to_string(),
            bridge_port,
        })
    }

    /// POST one message to the bridge at `address`.
    pub async fn deliver(
        &self,
        address: &str,
        message: &BridgeMessage,
    ) -> Result<(), DeliveryError> {
        let url = format!("http://{}:{}/message", address, self.bridge_port);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.auth_token)
            .json(message)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DeliveryError::Status(response.status().as_u16()));
        }

        debug!(address = %address, user_key = %message.user_id, "Message delivered to bridge");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> BridgeMessage {
        BridgeMessage {
            user_id: "user-1".to_string(),
            message: "hello".to_string(),
            channel: "web".to_string(),
            connection_id: "conn-1".to_string(),
            callback_url: "https://push.test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_deliver_posts_bearer_and_camel_case_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message"))
            .and(header("authorization", "Bearer bridge-token"))
            .and(body_partial_json(serde_json::json!({
                "userId": "user-1",
                "message": "hello",
                "channel": "web",
                "connectionId": "conn-1",
                "callbackUrl": "https://push.test"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let delivery =
            BridgeDelivery::with_options("bridge-token", server.address().port(), DELIVERY_TIMEOUT)
                .unwrap();
        delivery.deliver("127.0.0.1", &message()).await.unwrap();
    }

    #[tokio::test]
    async fn test_deliver_non_success_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let delivery =
            BridgeDelivery::with_options("bridge-token", server.address().port(), DELIVERY_TIMEOUT)
                .unwrap();
        let err = delivery.deliver("127.0.0.1", &message()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Status(503)));
    }

    #[tokio::test]
    async fn test_deliver_unreachable_bridge() {
        // Nothing listens on port 1.
        let delivery =
            BridgeDelivery::with_options("bridge-token", 1, Duration::from_millis(500)).unwrap();
        let err = delivery.deliver("127.0.0.1", &message()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Request(_)));
    }

    #[tokio::test]
    async fn test_deliver_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message"))
            .respond_with(ResponseTemplate::new(202).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let delivery = BridgeDelivery::with_options(
            "bridge-token",
            server.address().port(),
            Duration::from_millis(100),
        )
        .unwrap();
        let err = delivery.deliver("127.0.0.1", &message()).await.unwrap_err();
        match err {
            DeliveryError::Request(e) => assert!(e.is_timeout()),
            other => panic!("expected a timeout, got {other}"),
        }
    }
}

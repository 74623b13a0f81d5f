// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! One message through the agent and back out as a stream.
//!
//! Every message, whether drained from the pending queue or POSTed
//! directly at the bridge, takes the same path: prepend the context block
//! if this is the first message since boot, send the chat turn to the
//! agent, relay each delta to the callback endpoint, close the stream,
//! and persist the exchange. Failures collapse into a single `error`
//! event for the caller.

use std::sync::Arc;

use roost_core::model::{DEFAULT_CONVERSATION, ServerMessage};
use roost_core::store::StateStore;
use roost_protocol::client::AgentClient;
use tracing::{debug, error, warn};

use crate::callback::CallbackSender;
use crate::error::Result;
use crate::history::ContextPrefix;

/// Runs messages through the agent and streams the replies out.
pub struct MessageProcessor {
    client: Arc<AgentClient>,
    callback: CallbackSender,
    store: Arc<dyn StateStore>,
    context: Arc<ContextPrefix>,
}

impl MessageProcessor {
    /// Create a processor over a connected agent client.
    pub fn new(
        client: Arc<AgentClient>,
        callback: CallbackSender,
        store: Arc<dyn StateStore>,
        context: Arc<ContextPrefix>,
    ) -> Self {
        Self {
            client,
            callback,
            store,
            context,
        }
    }

    /// Process one message end to end and return the full response text.
    ///
    /// On failure the caller's connection receives one `error` event and
    /// the error propagates, nothing is recorded.
    pub async fn process(
        &self,
        user_id: &str,
        message: &str,
        channel: &str,
        connection_id: &str,
    ) -> Result<String> {
        match self.run_turn(user_id, message, connection_id).await {
            Ok(response) => {
                if !response.is_empty() {
                    if let Err(e) = self
                        .store
                        .record_exchange(user_id, DEFAULT_CONVERSATION, message, &response, channel)
                        .await
                    {
                        warn!(error = %e, user_key = %user_id, "Failed to record the exchange");
                    }
                }
                Ok(response)
            }
            Err(e) => {
                error!(
                    error = %e,
                    user_key = %user_id,
                    connection_id = %connection_id,
                    "Message processing failed"
                );
                let event = ServerMessage::Error {
                    error: e.to_string(),
                };
                if let Err(push_err) = self.callback.push(connection_id, &event).await {
                    warn!(
                        error = %push_err,
                        connection_id = %connection_id,
                        "Could not push the error event"
                    );
                }
                Err(e)
            }
        }
    }

    async fn run_turn(&self, user_id: &str, message: &str, connection_id: &str) -> Result<String> {
        // The first message after boot carries the conversation so far.
        let outgoing = match self.context.take().await {
            Some(block) => format!("{block}\n\n{message}"),
            None => message.to_string(),
        };

        let mut turn = self.client.send_chat(user_id, &outgoing).await?;
        debug!(run_id = turn.run_id(), user_key = %user_id, "Chat run accepted");

        let mut response = String::new();
        while let Some(fragment) = turn.next_delta().await? {
            response.push_str(&fragment);
            self.callback
                .push(connection_id, &ServerMessage::StreamChunk { content: fragment })
                .await?;
        }

        self.callback
            .push(connection_id, &ServerMessage::StreamEnd)
            .await?;
        Ok(response)
    }
}

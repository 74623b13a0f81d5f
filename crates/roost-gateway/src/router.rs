// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message routing.
//!
//! One `route` call decides what happens to an inbound user message: hand
//! it straight to a running bridge, claim the prewarmed spare, or park it
//! in the pending queue and (if nothing usable is booting) launch a fresh
//! instance. Delivery failures never surface to the caller; they downgrade
//! the outcome to queue-and-relaunch.

use std::sync::Arc;

use chrono::{Duration, Utc};
use roost_core::metrics::Metrics;
use roost_core::model::{
    BridgeMessage, PENDING_MESSAGE_TTL_SECS, PREWARM_USER_KEY, PendingMessage, TaskState,
    TaskStatus, pending_sort_key,
};
use roost_core::store::StateStore;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::delivery::BridgeDelivery;
use crate::error::Result;
use crate::launcher::{LaunchSpec, Launcher};

/// What `route` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteOutcome {
    /// Delivered directly to a running bridge.
    Sent,
    /// Parked in the pending queue; an instance is already on its way up.
    Queued,
    /// Parked in the pending queue and a new instance was launched.
    Started,
}

impl RouteOutcome {
    /// Lowercase wire form, as returned by the ingress API.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteOutcome::Sent => "sent",
            RouteOutcome::Queued => "queued",
            RouteOutcome::Started => "started",
        }
    }
}

/// Routes inbound messages to instances.
pub struct MessageRouter {
    store: Arc<dyn StateStore>,
    launcher: Arc<dyn Launcher>,
    delivery: BridgeDelivery,
    metrics: Metrics,
    bridge_auth_token: String,
    callback_url: String,
}

impl MessageRouter {
    /// Create a router over the given collaborators.
    pub fn new(
        store: Arc<dyn StateStore>,
        launcher: Arc<dyn Launcher>,
        delivery: BridgeDelivery,
        metrics: Metrics,
        bridge_auth_token: &str,
        callback_url: &str,
    ) -> Self {
        Self {
            store,
            launcher,
            delivery,
            metrics,
            bridge_auth_token: bridge_auth_token.to_string(),
            callback_url: callback_url.to_string(),
        }
    }

    /// Route one message for `user_key`.
    pub async fn route(
        &self,
        user_key: &str,
        message: &str,
        channel: &str,
        connection_id: &str,
    ) -> Result<RouteOutcome> {
        self.metrics
            .count_dimensioned("MessagesReceived", 1, "channel", channel);
        if let Err(e) = self.store.record_message_volume(channel, Utc::now()).await {
            warn!(channel = %channel, error = %e, "Failed to record message volume");
        }

        let bridge_message = BridgeMessage {
            user_id: user_key.to_string(),
            message: message.to_string(),
            channel: channel.to_string(),
            connection_id: connection_id.to_string(),
            callback_url: self.callback_url.clone(),
        };

        let state = self.store.get_task_state(user_key).await?;

        // A running instance with an address gets the message directly.
        let mut delivery_failed = false;
        if let Some(state) = &state
            && state.status == TaskStatus::Running
            && let Some(address) = &state.address
        {
            match self.delivery.deliver(address, &bridge_message).await {
                Ok(()) => {
                    debug!(user_key = %user_key, address = %address, "Message delivered directly");
                    return Ok(RouteOutcome::Sent);
                }
                Err(e) => {
                    warn!(
                        user_key = %user_key,
                        address = %address,
                        error = %e,
                        "Direct delivery failed, falling back to queue"
                    );
                    delivery_failed = true;
                }
            }
        }

        // The prewarmed spare is only up for grabs when the user has no
        // record at all; it never competes with an in-flight launch.
        if state.is_none()
            && let Some(outcome) = self.try_claim_prewarm(user_key, &bridge_message).await?
        {
            return Ok(outcome);
        }

        // Queue before any launch so the message survives a failed launch
        // call.
        let now = Utc::now();
        self.store
            .enqueue_pending(&PendingMessage {
                user_key: user_key.to_string(),
                sort_key: pending_sort_key(now),
                message: message.to_string(),
                channel: channel.to_string(),
                connection_id: connection_id.to_string(),
                created_at: now,
                expire_at: now + Duration::seconds(PENDING_MESSAGE_TTL_SECS),
            })
            .await?;

        if state.is_none() || delivery_failed {
            if state.is_some() {
                // The record pointed at a bridge that no longer answers.
                self.store.delete_task_state(user_key).await?;
            }
            let spec = LaunchSpec::for_user(user_key, &self.bridge_auth_token, &self.callback_url);
            let launched = self.launcher.launch(&spec).await?;
            self.store
                .put_task_state(&TaskState {
                    user_key: user_key.to_string(),
                    instance_handle: launched.handle.clone(),
                    status: TaskStatus::Starting,
                    address: None,
                    started_at: launched.started_at,
                    last_activity: Utc::now(),
                    expire_at: None,
                    prewarm_until: None,
                })
                .await?;
            info!(
                user_key = %user_key,
                handle = %launched.handle,
                "Instance launched for queued message"
            );
            return Ok(RouteOutcome::Started);
        }

        // A Starting record, or Running without an address, is still
        // booting and will drain the queue on its way up.
        debug!(user_key = %user_key, "Instance still booting, message queued");
        Ok(RouteOutcome::Queued)
    }

    /// Try to hand the prewarmed spare to this user. `None` means no claim
    /// happened and routing falls through; store errors propagate, delivery
    /// errors only cancel the claim.
    async fn try_claim_prewarm(
        &self,
        user_key: &str,
        message: &BridgeMessage,
    ) -> Result<Option<RouteOutcome>> {
        let Some(prewarm) = self.store.get_task_state(PREWARM_USER_KEY).await? else {
            return Ok(None);
        };
        if prewarm.status != TaskStatus::Running {
            return Ok(None);
        }
        let Some(address) = prewarm.address.clone() else {
            return Ok(None);
        };

        if let Err(e) = self.delivery.deliver(&address, message).await {
            warn!(
                user_key = %user_key,
                address = %address,
                error = %e,
                "Prewarmed instance did not take the message"
            );
            return Ok(None);
        }

        // The spare now belongs to this user.
        self.store.delete_task_state(PREWARM_USER_KEY).await?;
        self.store
            .put_task_state(&TaskState {
                user_key: user_key.to_string(),
                instance_handle: prewarm.instance_handle.clone(),
                status: TaskStatus::Running,
                address: Some(address),
                started_at: prewarm.started_at,
                last_activity: Utc::now(),
                expire_at: None,
                prewarm_until: None,
            })
            .await?;

        info!(
            user_key = %user_key,
            handle = %prewarm.instance_handle,
            "Prewarmed instance claimed"
        );
        Ok(Some(RouteOutcome::Sent))
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pending-queue drain on startup.
//!
//! Messages that arrived while the instance was booting sit in the
//! pending queue. They are replayed strictly in arrival order, one at a
//! time, and each entry is deleted only after its full response has been
//! produced. A processing failure stops the drain and leaves the
//! remainder queued; those entries either expire or get replayed by the
//! next instance.

use chrono::Utc;
use roost_core::metrics::Metrics;
use roost_core::store::StateStore;
use tracing::{debug, info};

use crate::error::Result;
use crate::processing::MessageProcessor;

/// Replay every queued message for `user_key` through the processor.
/// Returns how many entries were consumed.
pub async fn drain_pending(
    store: &dyn StateStore,
    processor: &MessageProcessor,
    metrics: &Metrics,
    user_key: &str,
) -> Result<u64> {
    let pending = store.pending_for(user_key).await?;
    if pending.is_empty() {
        debug!("No pending messages to drain");
        return Ok(0);
    }

    info!(count = pending.len(), "Draining pending messages");

    let mut consumed = 0u64;
    for entry in pending {
        let response = processor
            .process(
                &entry.user_key,
                &entry.message,
                &entry.channel,
                &entry.connection_id,
            )
            .await?;

        let latency_ms = (Utc::now() - entry.created_at).num_milliseconds().max(0) as u64;
        metrics.duration_ms_dimensioned("MessageLatency", latency_ms, "channel", &entry.channel);
        metrics.count_dimensioned(
            "ResponseLength",
            response.len() as u64,
            "channel",
            &entry.channel,
        );

        store.delete_pending(user_key, &entry.sort_key).await?;
        consumed += 1;
    }

    Ok(consumed)
}

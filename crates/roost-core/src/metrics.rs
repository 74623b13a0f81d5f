// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Operational metric emission.
//!
//! Metrics are emitted as structured tracing events on the `metrics` target,
//! so any subscriber (or log shipper) can pick them up without a dedicated
//! metrics pipeline. Emission is a no-op unless explicitly enabled, which
//! keeps development environments quiet.

use tracing::info;

/// Metric emitter shared across components.
#[derive(Debug, Clone)]
pub struct Metrics {
    enabled: bool,
}

impl Metrics {
    /// Create an emitter; `enabled` usually comes from `METRICS_ENABLED`.
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Create a disabled emitter.
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    /// Whether this emitter actually publishes anything.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Emit a count metric.
    pub fn count(&self, name: &str, value: u64) {
        if !self.enabled {
            return;
        }
        info!(target: "metrics", metric = name, value, unit = "count", "metric");
    }

    /// Emit a count metric carrying one dimension.
    pub fn count_dimensioned(
        &self,
        name: &str,
        value: u64,
        dimension: &str,
        dimension_value: &str,
    ) {
        if !self.enabled {
            return;
        }
        info!(
            target: "metrics",
            metric = name,
            value,
            unit = "count",
            dimension,
            dimension_value,
            "metric"
        );
    }

    /// Emit a duration metric in milliseconds.
    pub fn duration_ms(&self, name: &str, value: u64) {
        if !self.enabled {
            return;
        }
        info!(target: "metrics", metric = name, value, unit = "ms", "metric");
    }

    /// Emit a duration metric carrying one dimension.
    pub fn duration_ms_dimensioned(
        &self,
        name: &str,
        value: u64,
        dimension: &str,
        dimension_value: &str,
    ) {
        if !self.enabled {
            return;
        }
        info!(
            target: "metrics",
            metric = name,
            value,
            unit = "ms",
            dimension,
            dimension_value,
            "metric"
        );
    }
}

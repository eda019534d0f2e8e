// src/core/metrics.rs

//! Defines and registers Prometheus metrics for the live results hub.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, TextEncoder, register_counter, register_counter_vec,
    register_gauge,
};

lazy_static! {
    // --- Gauges ---
    /// The number of WebSocket clients currently connected.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("liveresult_connected_clients", "Number of currently connected WebSocket clients.").unwrap();

    // --- Counters ---
    /// The total number of WebSocket connections accepted since startup.
    pub static ref CONNECTIONS_TOTAL: Counter =
        register_counter!("liveresult_connections_total", "Total number of WebSocket connections accepted.").unwrap();
    /// Messages dequeued by the hub loop for fan-out, labeled by message kind.
    pub static ref MESSAGES_BROADCAST_TOTAL: CounterVec =
        register_counter_vec!("liveresult_messages_broadcast_total", "Total number of messages fanned out by the hub, labeled by kind.", &["kind"]).unwrap();
    /// Frames placed on session outbound queues.
    pub static ref MESSAGES_DELIVERED_TOTAL: Counter =
        register_counter!("liveresult_messages_delivered_total", "Total number of frames queued to sessions.").unwrap();
    /// Updates dropped because the hub broadcast queue was full.
    pub static ref BROADCAST_DROPPED_TOTAL: Counter =
        register_counter!("liveresult_broadcast_dropped_total", "Total number of updates dropped at the hub broadcast queue.").unwrap();
    /// Sessions removed by the hub, labeled by reason.
    pub static ref SESSIONS_EVICTED_TOTAL: CounterVec =
        register_counter_vec!("liveresult_sessions_evicted_total", "Total number of sessions removed by the hub, labeled by reason.", &["reason"]).unwrap();
    /// Inbound control messages, labeled by outcome.
    pub static ref CONTROL_MESSAGES_TOTAL: CounterVec =
        register_counter_vec!("liveresult_control_messages_total", "Total number of inbound control messages, labeled by result.", &["result"]).unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# failed to encode metrics: {e}\n"))
}

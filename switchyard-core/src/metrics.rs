// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Prometheus counters for the coordinator, registered in the default
//! registry on first use.

use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

lazy_static! {
    pub static ref MESSAGES_ROUTED: IntCounter = register_int_counter!(
        "switchyard_messages_routed_total",
        "Messages delivered to a registered actor"
    )
    .unwrap();
    pub static ref MESSAGES_DROPPED: IntCounter = register_int_counter!(
        "switchyard_messages_dropped_total",
        "Messages dropped because the destination was unknown or unreachable"
    )
    .unwrap();
    pub static ref SPAWNS: IntCounterVec = register_int_counter_vec!(
        "switchyard_spawns_total",
        "Spawn requests by actor kind and outcome",
        &["kind", "outcome"]
    )
    .unwrap();
    pub static ref HTTP_EXCHANGES: IntCounterVec = register_int_counter_vec!(
        "switchyard_http_exchanges_total",
        "HTTP request/response exchanges by function and outcome",
        &["function", "outcome"]
    )
    .unwrap();
    pub static ref FRAME_ERRORS: IntCounter = register_int_counter!(
        "switchyard_frame_errors_total",
        "IPC connections ended by a malformed frame"
    )
    .unwrap();
}

/// Force registration so every metric shows up before its first event.
pub fn init() {
    lazy_static::initialize(&MESSAGES_ROUTED);
    lazy_static::initialize(&MESSAGES_DROPPED);
    lazy_static::initialize(&SPAWNS);
    lazy_static::initialize(&HTTP_EXCHANGES);
    lazy_static::initialize(&FRAME_ERRORS);
}

/// All registered metrics in the Prometheus text format.
pub fn render() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

//! Prometheus metrics for the realtime bus

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

lazy_static! {
    /// Total events emitted
    pub static ref EVENTS_EMITTED_TOTAL: CounterVec = register_counter_vec!(
        "realtime_bus_events_emitted_total",
        "Total change events emitted",
        &["channel"]
    )
    .unwrap();

    /// Total events dropped (no subscribers connected)
    pub static ref EVENTS_DROPPED_TOTAL: CounterVec = register_counter_vec!(
        "realtime_bus_events_dropped_total",
        "Total change events dropped because no subscriber was connected",
        &["channel"]
    )
    .unwrap();
}

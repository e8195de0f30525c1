// Metrics and observability module
// This file handles the exporter's own process metrics: store call
// latency, store errors and reconciliation outcomes
//
// Numan Thabit 2025 Nov

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter_vec, CounterVec,
    HistogramVec, IntCounterVec,
};

pub static REQ_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "logs_exporter_store_request_latency_seconds",
        "latency for document store calls",
        &["operation"]
    )
    .unwrap()
});

pub static REQ_ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "logs_exporter_store_request_errors_total",
        "errors by document store operation",
        &["operation", "kind"]
    )
    .unwrap()
});

pub static COMBINATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "logs_exporter_combinations_total",
        "filter combinations queried, by outcome",
        &["target", "outcome"]
    )
    .unwrap()
});

pub static CYCLE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "logs_exporter_cycle_duration_seconds",
        "duration of one reconciliation pass per target",
        &["target"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .unwrap()
});

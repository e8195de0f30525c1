// Library root module for logs-exporter
// This file defines the public API and module structure for the logs-exporter library
// It exports the query engine, gauge cache and reconciliation driver
//
// Numan Thabit 2025 Nov

pub mod api;
pub mod config;
pub mod credentials;
pub mod driver;
pub mod errors;
pub mod gauges;
pub mod metrics;
pub mod query;
pub mod state;
pub mod transport;

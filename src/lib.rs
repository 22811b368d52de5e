//! Sentry exporter - Prometheus probe exporter for the Sentry API.
//!
//! On each scrape the exporter fans out concurrent queries against the
//! Sentry HTTP API and renders the results as Prometheus exposition lines.

pub mod client;
pub mod config;
pub mod metrics;
pub mod probe;
pub mod web;

//! HTTP request handlers.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
};
use serde::Deserialize;

use super::AppState;
use crate::metrics::MetricsWriter;
use crate::probe::{self, ProbeKind, ProbeParams};

#[derive(Debug, Deserialize)]
pub struct ProbeQuery {
    pub module: Option<String>,
    pub prober: Option<String>,
    pub target: Option<String>,
    pub timeout: Option<String>,
    pub above: Option<i64>,
    pub period: Option<String>,
}

/// Run the selected probe and stream its metric lines back.
pub async fn handle_probe(
    State(state): State<AppState>,
    Query(query): Query<ProbeQuery>,
) -> impl IntoResponse {
    let module_name = query.module.as_deref().unwrap_or("sentry");
    let module = match state.config.module(module_name).await {
        Some(module) => module,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                format!("Unknown module {:?}", module_name),
            )
                .into_response();
        }
    };

    let prober_name = query.prober.as_deref().unwrap_or_default();
    let kind = match ProbeKind::from_name(prober_name) {
        Some(kind) => kind,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                format!("Unknown prober {:?}", prober_name),
            )
                .into_response();
        }
    };

    tracing::info!("Starting prober {} for module {}", prober_name, module_name);
    state.probes_served.fetch_add(1, Ordering::Relaxed);

    let params = ProbeParams {
        target: query.target,
        timeout: query.timeout,
        above: query.above,
        period: query.period,
    };

    let writer = Arc::new(MetricsWriter::new());
    let start = Instant::now();
    let success = probe::run_probe(kind, &params, &module, &state.cache, &writer).await;

    writer.sample(
        "probe_duration_seconds",
        &[],
        format!("{:.6}", start.elapsed().as_secs_f64()),
    );
    writer.sample("probe_success", &[], if success { 1 } else { 0 });

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        writer.render(),
    )
        .into_response()
}

/// Exporter self-metrics in Prometheus text format.
pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let mut out = String::new();

    out.push_str("# HELP sentry_exporter_build_info Build information.\n");
    out.push_str("# TYPE sentry_exporter_build_info gauge\n");
    out.push_str(&format!(
        "sentry_exporter_build_info{{version=\"{}\"}} 1\n",
        env!("CARGO_PKG_VERSION")
    ));

    out.push_str("# HELP sentry_exporter_probes_total Probe requests served since startup.\n");
    out.push_str("# TYPE sentry_exporter_probes_total counter\n");
    out.push_str(&format!(
        "sentry_exporter_probes_total {}\n",
        state.probes_served.load(Ordering::Relaxed)
    ));

    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], out)
}

/// Re-read the config file.
pub async fn handle_reload(State(state): State<AppState>) -> impl IntoResponse {
    match state.config.reload().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::error!("Error reloading config: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to reload config: {}", e),
            )
                .into_response()
        }
    }
}

pub async fn handle_index() -> impl IntoResponse {
    Html(
        r#"<html>
            <head><title>Sentry Exporter</title></head>
            <body>
            <h1>Sentry Exporter</h1>
            <p><a href="/probe?prober=lag&target=myproject">Probe specific Sentry project</a></p>
            <p><a href="/probe?prober=lag">Probe all Sentry projects</a></p>
            <p><a href="/metrics">Metrics</a></p>
            </body>
            </html>"#,
    )
}

//! Event throughput and processing-lag probe.
//!
//! Fans out one worker task per project, each fetching the received and
//! rejected event-count series (and optionally the project's rate limit),
//! then aggregates the newest event timestamp across all workers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use super::{resolve_timeout, ProbeParams, ProjectCache};
use crate::client::{self, ApiClient, ApiError};
use crate::config::{HttpProbe, Module};
use crate::metrics::MetricsWriter;

/// Stats window requested for each project.
const LOOKBACK: Duration = Duration::from_secs(60 * 60);

/// Delay between worker launches, a crude client-side rate limit protecting
/// the upstream API from a burst.
const LAUNCH_STAGGER: Duration = Duration::from_millis(50);

pub async fn probe_lag(
    params: &ProbeParams,
    module: &Module,
    cache: &ProjectCache,
    writer: &Arc<MetricsWriter>,
) -> bool {
    let config = Arc::new(module.http.clone());
    let client = match ApiClient::new(resolve_timeout(params, module.http.lag.timeout)) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to build API client: {}", e);
            return false;
        }
    };

    let failures = Arc::new(AtomicU64::new(0));

    let targets = match params.target.as_deref() {
        Some(target) if !target.is_empty() => vec![target.to_string()],
        _ => cache.targets(&client, &config, &failures, writer).await,
    };
    tracing::info!("Processing lag probe for {} Sentry projects", targets.len());

    // Bounded to the worker count; every worker sends exactly one report.
    let (tx, mut rx) = mpsc::channel::<i64>(targets.len().max(1));
    let mut stagger = tokio::time::interval(LAUNCH_STAGGER);
    let mut workers = Vec::with_capacity(targets.len());

    for target in &targets {
        stagger.tick().await;
        let target = target.clone();
        let config = config.clone();
        let client = client.clone();
        let writer = writer.clone();
        let failures = failures.clone();
        let tx = tx.clone();
        workers.push(tokio::spawn(async move {
            let latest = probe_project(&target, &config, &client, &writer, &failures).await;
            let _ = tx.send(latest).await;
        }));
    }
    drop(tx);

    // The channel drains once every worker has reported.
    let mut latest_timestamp = 0;
    while let Some(ts) = rx.recv().await {
        if ts > latest_timestamp {
            latest_timestamp = ts;
        }
    }
    for worker in workers {
        let _ = worker.await;
    }

    if latest_timestamp > 0 {
        writer.sample("sentry_events_latest_timestamp", &[], latest_timestamp);
        writer.sample("sentry_events_lag_seconds", &[], lag_seconds(latest_timestamp));
    }
    let total_failures = failures.load(Ordering::Relaxed);
    writer.sample("sentry_fetch_failures", &[], total_failures);

    tracing::info!("Processed probe with {} fetch failures", total_failures);
    true
}

/// Probe one project, reporting its newest event timestamp (0 when the
/// project produced no recent events).
///
/// A failed sub-call is counted and skipped; the remaining steps still run.
async fn probe_project(
    target: &str,
    config: &HttpProbe,
    client: &ApiClient,
    writer: &MetricsWriter,
    failures: &AtomicU64,
) -> i64 {
    let mut latest_timestamp = 0;

    match request_event_count(target, "received", config, client, writer).await {
        Ok(ts) => latest_timestamp = ts,
        Err(e) => {
            tracing::error!("{}", e);
            failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    if let Err(e) = request_event_count(target, "rejected", config, client, writer).await {
        tracing::error!("{}", e);
        failures.fetch_add(1, Ordering::Relaxed);
    }

    if config.ratelimit {
        if let Err(e) = request_rate_limit(target, config, client, writer).await {
            tracing::error!("{}", e);
            failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    tracing::debug!("Processed project {}", target);
    latest_timestamp
}

/// Fetch one event-count series and emit its per-project metrics.
async fn request_event_count(
    target: &str,
    stat: &str,
    config: &HttpProbe,
    client: &ApiClient,
    writer: &MetricsWriter,
) -> Result<i64, ApiError> {
    let since = Utc::now().timestamp() - LOOKBACK.as_secs() as i64;
    let path = format!(
        "projects/{}/{}/stats/?resolution=10s&stat={}&since={}",
        config.organization, target, stat, since
    );

    let body = client.request_body(&path, config).await?;
    let summary = client::extract_event_series(&body)?;

    let labels = [("stat", stat), ("project", target)];
    writer.sample("sentry_events_total", &labels, summary.total);
    if summary.latest_timestamp > 0 {
        writer.sample(
            "sentry_project_latest_timestamp",
            &labels,
            summary.latest_timestamp,
        );
        writer.sample(
            "sentry_project_lag_seconds",
            &labels,
            lag_seconds(summary.latest_timestamp),
        );
    }
    Ok(summary.latest_timestamp)
}

/// Fetch the project's key list and emit the first key's rate limit.
async fn request_rate_limit(
    target: &str,
    config: &HttpProbe,
    client: &ApiClient,
    writer: &MetricsWriter,
) -> Result<(), ApiError> {
    let path = format!("projects/{}/{}/keys/", config.organization, target);
    let body = client.request_body(&path, config).await?;
    let rate = client::extract_rate_limit(&body)?;

    writer.sample(
        "sentry_project_rate_limit_seconds_total",
        &[("project", target)],
        format!("{:.6}", rate),
    );
    Ok(())
}

fn lag_seconds(latest_timestamp: i64) -> i64 {
    Utc::now().timestamp() - latest_timestamp
}

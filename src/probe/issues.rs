//! High-frequency issue probe over the paginated issues API.

use std::collections::HashMap;

use super::{resolve_timeout, ProbeParams};
use crate::client::{self, ApiClient, ApiError};
use crate::config::{HttpProbe, Module};
use crate::metrics::MetricsWriter;

/// Issue count threshold when neither query nor module config sets one.
const DEFAULT_THRESHOLD: i64 = 10_000;

/// Stats period when neither query nor module config sets one.
const DEFAULT_PERIOD: &str = "14d";

/// Page size requested from the issues endpoint.
const PAGE_LIMIT: u32 = 25;

pub async fn probe_issues(
    params: &ProbeParams,
    module: &Module,
    writer: &MetricsWriter,
) -> bool {
    let config = &module.http;

    let threshold = params
        .above
        .or_else(|| config.issues.above.filter(|a| *a > 0))
        .unwrap_or(DEFAULT_THRESHOLD);
    let period = params
        .period
        .clone()
        .or_else(|| config.issues.period.clone())
        .unwrap_or_else(|| DEFAULT_PERIOD.to_string());

    if period != "14d" && period != "24h" {
        tracing::error!("Invalid period {:?} (must be 14d or 24h)", period);
        return false;
    }

    let client = match ApiClient::new(resolve_timeout(params, config.issues.timeout)) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to build API client: {}", e);
            return false;
        }
    };

    tracing::info!("Processing issues probe for period {} above {}", period, threshold);

    let (per_project, total) = count_issues_above(threshold, &period, config, &client).await;

    let above = threshold.to_string();
    for (project, count) in &per_project {
        writer.sample(
            "sentry_project_high_freq_issues",
            &[("project", project), ("above", &above), ("period", &period)],
            format!("{:.1}", *count as f64),
        );
    }
    writer.sample(
        "sentry_high_freq_issues",
        &[("above", &above), ("period", &period)],
        format!("{:.1}", total as f64),
    );

    tracing::info!("Processed issues probe");
    true
}

/// Walk the paginated issues list, counting issues at or above `threshold`
/// per project.
///
/// The API returns issues sorted by descending frequency, so the walk stops
/// at the first page containing a sub-threshold issue. A failed page leaves
/// the walk with whatever was accumulated so far.
async fn count_issues_above(
    threshold: i64,
    period: &str,
    config: &HttpProbe,
    client: &ApiClient,
) -> (HashMap<String, i64>, i64) {
    let mut per_project: HashMap<String, i64> = HashMap::new();
    let mut total = 0;
    let mut cursor = String::new();

    loop {
        tracing::info!("Querying issues list with cursor '{}'", cursor);
        let page = match fetch_page(threshold, period, &cursor, config, client).await {
            Ok(page) => page,
            Err(e) => {
                tracing::error!("{}", e);
                break;
            }
        };

        for (project, count) in page.qualifying {
            *per_project.entry(project).or_insert(0) += count;
            total += count;
        }

        match page.next_cursor {
            Some(next) => cursor = format!("cursor={}", next),
            None => break,
        }
    }

    (per_project, total)
}

struct IssuePage {
    /// Qualifying issue count per project slug on this page.
    qualifying: HashMap<String, i64>,
    /// Cursor for the next page, unless the walk should stop.
    next_cursor: Option<String>,
}

async fn fetch_page(
    threshold: i64,
    period: &str,
    cursor: &str,
    config: &HttpProbe,
    client: &ApiClient,
) -> Result<IssuePage, ApiError> {
    let path = format!(
        "organizations/{}/issues/?collapse=stats&expand=owners&expand=inbox&limit={}&query=is%3Aunresolved&sort=freq&statsPeriod={}&{}",
        config.organization, PAGE_LIMIT, period, cursor
    );

    let response = client.request(&path, config).await?;
    let link = response
        .headers()
        .get("link")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_default();
    let body = response
        .bytes()
        .await
        .map_err(|e| ApiError::Transport(e.to_string()))?;
    let issues = client::extract_issues(&body)?;

    if issues.is_empty() {
        return Ok(IssuePage {
            qualifying: HashMap::new(),
            next_cursor: None,
        });
    }

    let mut project_of: HashMap<String, String> = HashMap::with_capacity(issues.len());
    let mut ids = Vec::with_capacity(issues.len());
    for issue in issues {
        ids.push(issue.id.clone());
        project_of.insert(issue.id, issue.project.slug);
    }

    let counts = fetch_issue_counts(&ids, period, config, client).await?;

    let mut qualifying: HashMap<String, i64> = HashMap::new();
    let mut exhausted = false;
    for (id, count) in &counts {
        if let Some(project) = project_of.get(id) {
            if *count >= threshold {
                *qualifying.entry(project.clone()).or_insert(0) += 1;
            } else {
                exhausted = true;
            }
        }
    }

    // Below-threshold issue seen: every later page is below it too.
    let next_cursor = if exhausted {
        None
    } else {
        client::next_cursor(&link)
    };

    Ok(IssuePage {
        qualifying,
        next_cursor,
    })
}

/// Batch-fetch event counts for every issue id on a page in one call.
async fn fetch_issue_counts(
    ids: &[String],
    period: &str,
    config: &HttpProbe,
    client: &ApiClient,
) -> Result<HashMap<String, i64>, ApiError> {
    let mut path = format!(
        "organizations/{}/issues-stats/?query=is:unresolved&sort=freq&statsPeriod={}",
        config.organization, period
    );
    for id in ids {
        path.push_str("&groups=");
        path.push_str(id);
    }

    let body = client.request_body(&path, config).await?;
    client::extract_issue_counts(&body)
}

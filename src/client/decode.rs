//! Decoders for Sentry API response bodies.
//!
//! Each decoder takes a raw body and produces the numbers the probers
//! aggregate. Malformed bodies are reported as [`ApiError::Decode`].

use std::collections::HashMap;

use serde::Deserialize;

use super::ApiError;

#[derive(Debug, Deserialize)]
struct ProjectEntry {
    slug: String,
}

/// Decode the organization project list into slugs.
pub fn extract_projects(body: &[u8]) -> Result<Vec<String>, ApiError> {
    let entries: Vec<ProjectEntry> = serde_json::from_slice(body).map_err(decode_err)?;
    Ok(entries.into_iter().map(|p| p.slug).collect())
}

/// Summary of one time-bucketed event-count series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesSummary {
    /// Sum over every bucket count.
    pub total: i64,
    /// Timestamp of the newest bucket with a nonzero count, 0 if none.
    pub latest_timestamp: i64,
}

/// Decode a `[[timestamp, count], ...]` stats series, oldest bucket first.
pub fn extract_event_series(body: &[u8]) -> Result<SeriesSummary, ApiError> {
    let buckets: Vec<(i64, i64)> = serde_json::from_slice(body).map_err(decode_err)?;
    let total = buckets.iter().map(|(_, count)| count).sum();
    let latest_timestamp = buckets
        .iter()
        .rev()
        .find(|(_, count)| *count > 0)
        .map(|(ts, _)| *ts)
        .unwrap_or(0);
    Ok(SeriesSummary {
        total,
        latest_timestamp,
    })
}

#[derive(Debug, Deserialize)]
struct ProjectKey {
    #[serde(default, rename = "rateLimit")]
    rate_limit: Option<RateLimit>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimit {
    #[serde(default)]
    window: i64,
    #[serde(default)]
    count: i64,
}

/// Decode the first project key's rate limit as requests per second.
///
/// A missing key or descriptor, or a descriptor without a positive window,
/// yields 0.
pub fn extract_rate_limit(body: &[u8]) -> Result<f64, ApiError> {
    let keys: Vec<ProjectKey> = serde_json::from_slice(body).map_err(decode_err)?;
    match keys.first().and_then(|k| k.rate_limit.as_ref()) {
        Some(limit) if limit.window > 0 => Ok(limit.count as f64 / limit.window as f64),
        _ => Ok(0.0),
    }
}

/// One issue on a page of the issues listing.
#[derive(Debug, Deserialize)]
pub struct IssueRecord {
    pub id: String,
    pub project: IssueProject,
}

/// The project an issue belongs to.
#[derive(Debug, Deserialize)]
pub struct IssueProject {
    pub slug: String,
}

/// Decode one page of the paginated issues listing.
pub fn extract_issues(body: &[u8]) -> Result<Vec<IssueRecord>, ApiError> {
    serde_json::from_slice(body).map_err(decode_err)
}

#[derive(Debug, Deserialize)]
struct IssueStatsEntry {
    id: String,
    #[serde(default)]
    count: Option<String>,
    #[serde(default)]
    lifetime: Option<LifetimeStats>,
}

#[derive(Debug, Deserialize)]
struct LifetimeStats {
    #[serde(default)]
    count: Option<String>,
}

/// Decode the batched issue stats into `issue id -> lifetime event count`.
///
/// The lifetime count is preferred over the period-scoped one; counts that
/// fail to parse are treated as 0.
pub fn extract_issue_counts(body: &[u8]) -> Result<HashMap<String, i64>, ApiError> {
    let entries: Vec<IssueStatsEntry> = serde_json::from_slice(body).map_err(decode_err)?;
    let mut counts = HashMap::with_capacity(entries.len());
    for entry in entries {
        let raw = entry
            .lifetime
            .and_then(|l| l.count)
            .or(entry.count)
            .unwrap_or_default();
        counts.insert(entry.id, raw.parse().unwrap_or(0));
    }
    Ok(counts)
}

/// Extract the `rel="next"` cursor from a `link` response header.
///
/// The header is a comma-space-separated list of segments, each carrying
/// `rel="..."` and `cursor="..."` parameters.
pub fn next_cursor(link: &str) -> Option<String> {
    for part in link.split(", ") {
        if !part.contains("rel=\"next\"") {
            continue;
        }
        for piece in part.split(';') {
            let piece = piece.trim();
            if let Some(value) = piece
                .strip_prefix("cursor=\"")
                .and_then(|v| v.strip_suffix('"'))
            {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn decode_err(e: serde_json::Error) -> ApiError {
    ApiError::Decode(e.to_string())
}

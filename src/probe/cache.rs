//! Cached project list shared across scrapes.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use crate::client::{self, ApiClient, ApiError};
use crate::config::HttpProbe;
use crate::metrics::MetricsWriter;

/// Number of scrapes after which the cached list is refreshed.
const STALENESS_LIMIT: u32 = 50;

/// Lock-guarded project list with a count-based staleness trigger.
///
/// The list-projects call is expensive, so all-project scrapes reuse the
/// last list and only refresh once the staleness counter runs out. The lock
/// is held across the refresh-or-serve decision, so concurrent scrapes
/// cannot race on the counter.
pub struct ProjectCache {
    inner: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    projects: Vec<String>,
    staleness: u32,
}

impl Default for ProjectCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CacheState::default()),
        }
    }

    /// Return the projects to probe, refreshing from the API when the cache
    /// is empty or has gone stale.
    ///
    /// A failed refresh leaves the cache empty; the next scrape retries.
    pub async fn targets(
        &self,
        client: &ApiClient,
        config: &HttpProbe,
        failures: &AtomicU64,
        writer: &MetricsWriter,
    ) -> Vec<String> {
        let mut state = self.inner.lock().await;
        state.staleness += 1;
        if state.projects.is_empty() || state.staleness >= STALENESS_LIMIT {
            state.projects = list_projects(client, config, failures, writer).await;
            state.staleness = 0;
        }
        state.projects.clone()
    }
}

/// Fetch every project slug in the organization.
async fn list_projects(
    client: &ApiClient,
    config: &HttpProbe,
    failures: &AtomicU64,
    writer: &MetricsWriter,
) -> Vec<String> {
    let path = format!("organizations/{}/projects/", config.organization);
    let result: Result<Vec<String>, ApiError> = async {
        let body = client.request_body(&path, config).await?;
        client::extract_projects(&body)
    }
    .await;

    match result {
        Ok(projects) => {
            writer.sample("sentry_projects_total", &[], projects.len());
            projects
        }
        Err(e) => {
            tracing::error!("Failed to list projects: {}", e);
            failures.fetch_add(1, Ordering::Relaxed);
            Vec::new()
        }
    }
}

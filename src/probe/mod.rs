//! Probe engine: per-scrape orchestration of Sentry API queries.

mod cache;
mod issues;
mod lag;

pub use cache::ProjectCache;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Module;
use crate::metrics::MetricsWriter;

/// The closed set of probe flavors served by `/probe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    /// Event throughput and processing lag per project.
    Lag,
    /// Issues firing above a frequency threshold.
    Issues,
}

impl ProbeKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "lag" => Some(ProbeKind::Lag),
            "issues" => Some(ProbeKind::Issues),
            _ => None,
        }
    }
}

/// Per-request overrides parsed from the probe query string.
#[derive(Debug, Default, Clone)]
pub struct ProbeParams {
    /// Probe a single project instead of the whole organization.
    pub target: Option<String>,
    /// Per-call timeout override, a duration string.
    pub timeout: Option<String>,
    /// Issue count threshold override.
    pub above: Option<i64>,
    /// Issue stats period override.
    pub period: Option<String>,
}

/// Run one probe of the given kind, writing metric lines into `writer`.
///
/// Returns whether the probe as a whole succeeded. Individual failed API
/// calls do not fail a probe; they are counted in `sentry_fetch_failures`.
pub async fn run_probe(
    kind: ProbeKind,
    params: &ProbeParams,
    module: &Module,
    cache: &ProjectCache,
    writer: &Arc<MetricsWriter>,
) -> bool {
    match kind {
        ProbeKind::Lag => lag::probe_lag(params, module, cache, writer).await,
        ProbeKind::Issues => issues::probe_issues(params, module, writer).await,
    }
}

/// Resolve the per-call timeout: query override first, then the module default.
fn resolve_timeout(params: &ProbeParams, module_timeout: Option<Duration>) -> Option<Duration> {
    params
        .timeout
        .as_deref()
        .and_then(crate::config::parse_duration)
        .or(module_timeout)
}

//! Integration tests for the lag probe against a mock Sentry API.

use std::sync::Arc;

use mockito::Matcher;
use sentry_exporter::config::{HttpProbe, Module};
use sentry_exporter::metrics::MetricsWriter;
use sentry_exporter::probe::{self, ProbeKind, ProbeParams, ProjectCache};

fn module_for(server: &mockito::ServerGuard) -> Module {
    Module {
        http: HttpProbe {
            domain: server.url(),
            organization: "test-org".to_string(),
            ..Default::default()
        },
    }
}

async fn run_lag(params: ProbeParams, module: &Module, cache: &ProjectCache) -> (bool, String) {
    let writer = Arc::new(MetricsWriter::new());
    let success = probe::run_probe(ProbeKind::Lag, &params, module, cache, &writer).await;
    (success, writer.render())
}

#[tokio::test]
async fn test_explicit_target_skips_project_list() {
    let mut server = mockito::Server::new_async().await;
    let module = module_for(&server);

    let projects = server
        .mock("GET", "/api/0/organizations/test-org/projects/")
        .expect(0)
        .create_async()
        .await;
    let received = server
        .mock(
            "GET",
            Matcher::Regex(r"/projects/test-org/app/stats/.*stat=received".to_string()),
        )
        .with_body("[[100, 2], [200, 5], [300, 0]]")
        .create_async()
        .await;
    let rejected = server
        .mock(
            "GET",
            Matcher::Regex(r"/projects/test-org/app/stats/.*stat=rejected".to_string()),
        )
        .with_body("[[100, 0], [200, 0]]")
        .create_async()
        .await;

    let cache = ProjectCache::new();
    let params = ProbeParams {
        target: Some("app".to_string()),
        ..Default::default()
    };
    let (success, body) = run_lag(params, &module, &cache).await;

    assert!(success);
    assert!(body.contains("sentry_events_total{stat=\"received\",project=\"app\"} 7\n"));
    assert!(body.contains("sentry_project_latest_timestamp{stat=\"received\",project=\"app\"} 200\n"));
    assert!(body.contains("sentry_project_lag_seconds{stat=\"received\",project=\"app\"}"));
    assert!(body.contains("sentry_events_total{stat=\"rejected\",project=\"app\"} 0\n"));
    // The rejected series had no nonzero bucket, so no timestamp line for it.
    assert!(!body.contains("sentry_project_latest_timestamp{stat=\"rejected\""));
    assert!(body.contains("sentry_events_latest_timestamp 200\n"));
    assert!(body.contains("sentry_events_lag_seconds "));
    assert!(body.contains("sentry_fetch_failures 0\n"));

    projects.assert_async().await;
    received.assert_async().await;
    rejected.assert_async().await;
}

#[tokio::test]
async fn test_failures_counted_per_call() {
    let mut server = mockito::Server::new_async().await;
    let mut module = module_for(&server);
    module.http.ratelimit = true;

    let projects = server
        .mock("GET", "/api/0/organizations/test-org/projects/")
        .with_body(r#"[{"slug": "one"}, {"slug": "two"}]"#)
        .create_async()
        .await;
    let stats = server
        .mock("GET", Matcher::Regex(r"/stats/".to_string()))
        .with_status(500)
        .expect(4)
        .create_async()
        .await;
    let keys = server
        .mock("GET", Matcher::Regex(r"/keys/".to_string()))
        .with_status(500)
        .expect(2)
        .create_async()
        .await;

    let cache = ProjectCache::new();
    let (success, body) = run_lag(ProbeParams::default(), &module, &cache).await;

    // Failed project calls never fail the probe itself.
    assert!(success);
    assert!(body.contains("sentry_projects_total 2\n"));
    assert!(body.contains("sentry_fetch_failures 6\n"));
    assert!(!body.contains("sentry_events_latest_timestamp"));
    assert!(!body.contains("sentry_events_lag_seconds"));

    projects.assert_async().await;
    stats.assert_async().await;
    keys.assert_async().await;
}

#[tokio::test]
async fn test_org_latest_timestamp_is_max_across_projects() {
    let mut server = mockito::Server::new_async().await;
    let module = module_for(&server);

    let projects = server
        .mock("GET", "/api/0/organizations/test-org/projects/")
        .with_body(r#"[{"slug": "one"}, {"slug": "two"}]"#)
        .create_async()
        .await;
    let stats_one = server
        .mock(
            "GET",
            Matcher::Regex(r"/projects/test-org/one/stats/".to_string()),
        )
        .with_body("[[100, 1]]")
        .expect(2)
        .create_async()
        .await;
    let stats_two = server
        .mock(
            "GET",
            Matcher::Regex(r"/projects/test-org/two/stats/".to_string()),
        )
        .with_body("[[900, 4]]")
        .expect(2)
        .create_async()
        .await;

    let cache = ProjectCache::new();
    let (success, body) = run_lag(ProbeParams::default(), &module, &cache).await;

    assert!(success);
    assert!(body.contains("sentry_events_latest_timestamp 900\n"));
    assert!(body.contains("sentry_fetch_failures 0\n"));

    projects.assert_async().await;
    stats_one.assert_async().await;
    stats_two.assert_async().await;
}

#[tokio::test]
async fn test_rate_limit_metric() {
    let mut server = mockito::Server::new_async().await;
    let mut module = module_for(&server);
    module.http.ratelimit = true;

    let stats = server
        .mock("GET", Matcher::Regex(r"/stats/".to_string()))
        .with_body("[]")
        .expect(2)
        .create_async()
        .await;
    let keys = server
        .mock("GET", "/api/0/projects/test-org/app/keys/")
        .with_body(r#"[{"id": "k1", "rateLimit": {"window": 60, "count": 120}}]"#)
        .create_async()
        .await;

    let cache = ProjectCache::new();
    let params = ProbeParams {
        target: Some("app".to_string()),
        ..Default::default()
    };
    let (success, body) = run_lag(params, &module, &cache).await;

    assert!(success);
    assert!(body.contains("sentry_project_rate_limit_seconds_total{project=\"app\"} 2.000000\n"));
    assert!(body.contains("sentry_fetch_failures 0\n"));

    stats.assert_async().await;
    keys.assert_async().await;
}

#[tokio::test]
async fn test_project_list_cached_across_scrapes() {
    let mut server = mockito::Server::new_async().await;
    let module = module_for(&server);

    // 51 all-project scrapes: one fetch to fill the cache, one when the
    // staleness counter runs out on the 51st scrape.
    let projects = server
        .mock("GET", "/api/0/organizations/test-org/projects/")
        .with_body(r#"[{"slug": "app"}]"#)
        .expect(2)
        .create_async()
        .await;
    let stats = server
        .mock("GET", Matcher::Regex(r"/stats/".to_string()))
        .with_body("[]")
        .expect(102)
        .create_async()
        .await;

    let cache = ProjectCache::new();
    for _ in 0..51 {
        let (success, body) = run_lag(ProbeParams::default(), &module, &cache).await;
        assert!(success);
        assert!(body.contains("sentry_fetch_failures 0\n"));
    }

    projects.assert_async().await;
    stats.assert_async().await;
}

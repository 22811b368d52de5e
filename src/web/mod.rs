//! Scrape HTTP server.

mod handlers;

use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::SharedConfig;
use crate::probe::ProjectCache;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SharedConfig>,
    pub cache: Arc<ProjectCache>,
    pub probes_served: Arc<AtomicU64>,
}

/// Web server exposing the probe and self-metrics endpoints.
pub struct Server {
    state: AppState,
    listen: SocketAddr,
}

impl Server {
    pub fn new(config: Arc<SharedConfig>, listen: SocketAddr) -> Self {
        Self {
            state: AppState {
                config,
                cache: Arc::new(ProjectCache::new()),
                probes_served: Arc::new(AtomicU64::new(0)),
            },
            listen,
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        Router::new()
            .route("/", get(handlers::handle_index))
            .route("/probe", get(handlers::handle_probe))
            .route("/metrics", get(handlers::handle_metrics))
            .route("/-/reload", post(handlers::handle_reload))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the server on the configured address.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let router = self.routes();

        tracing::info!("Listening on {}", self.listen);

        let listener = tokio::net::TcpListener::bind(self.listen).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}

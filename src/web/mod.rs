//! Web layer module
//!
//! Thin axum handlers over the injected [`CatalogStore`]. Handlers only
//! translate between HTTP and store calls; status mapping for store errors
//! lives in [`responses`].

use anyhow::Result;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::WebConfig;
use crate::repositories::CatalogStore;

pub mod api;
pub mod handlers;
pub mod responses;

pub use responses::{ApiError, MessageResponse};

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: &WebConfig, store: Arc<dyn CatalogStore>) -> Result<Self> {
        let app = create_router(AppState { store });
        let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

        Ok(Self { app, addr })
    }

    /// Serve until the token is cancelled, then drain in-flight requests
    pub async fn serve_with_cancellation(self, cancellation_token: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.addr, e))?;

        let shutdown_signal = async move {
            cancellation_token.cancelled().await;
            tracing::info!("Web server received cancellation signal, shutting down gracefully");
        };

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal)
            .await?;
        Ok(())
    }

    /// Get the host address
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// Build the full router around a store
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/components",
            get(api::list_components).post(api::create_component),
        )
        .route("/components/:component_id", get(api::get_component))
        .route(
            "/components/:component_id/identicon",
            get(api::get_component_identicon),
        )
        .route("/teams", get(api::list_teams).post(api::create_team))
        .route("/teams/:team_id", get(api::get_team))
        .route("/teams/:team_id/components", get(api::list_team_components))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CatalogStore>,
}

//! HTTP API server for presentation layers

pub mod health;
pub mod session;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::remote::CardService;
use crate::session::SessionHandle;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub session: SessionHandle,
    pub cards: Arc<dyn CardService>,
}

/// API server over one running session
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub fn new(session: SessionHandle, cards: Arc<dyn CardService>, port: u16) -> Self {
        Self {
            state: Arc::new(ApiState { session, cards }),
            port,
        }
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let router = Router::new()
            .nest("/api", session::router(Arc::clone(&self.state)))
            .merge(health::router())
            .merge(health::ready_router(Arc::clone(&self.state)));

        // CORS layer for cross-origin requests from a local frontend
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

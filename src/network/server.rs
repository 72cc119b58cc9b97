//! HTTP Server
//!
//! Binds the listener and serves the router until shutdown.

use std::future::Future;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{KvError, Result};

use super::handlers;

/// Build the router over a shared engine
pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/db/:key", get(handlers::get_value).post(handlers::put_value))
        .route("/health", get(handlers::health))
        .with_state(engine)
}

/// HTTP server for segkv
pub struct HttpServer {
    listen_addr: String,
    engine: Arc<Engine>,
}

impl HttpServer {
    /// Create a new server with the given config and engine
    pub fn new(config: &Config, engine: Arc<Engine>) -> Self {
        Self {
            listen_addr: config.listen_addr.clone(),
            engine,
        }
    }

    pub fn router(&self) -> Router {
        router(Arc::clone(&self.engine))
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(&self.listen_addr)
            .await
            .map_err(|e| KvError::Network(format!("failed to bind {}: {}", self.listen_addr, e)))?;

        tracing::info!(addr = %self.listen_addr, "HTTP server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| KvError::Network(e.to_string()))
    }
}

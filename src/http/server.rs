//! HTTP server implementation.

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::service::{router, AppState};
use crate::error::{Result, ThrottleError};
use crate::ratelimit::{RateLimiter, RuleRegistry};

/// HTTP server for the rate limit decision service.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Shared limiter and rule registry
    state: AppState,
    /// Whether `POST /admin/reset` is mounted
    enable_reset: bool,
}

impl HttpServer {
    /// Create a new server around an existing limiter and rule registry.
    pub fn new(addr: SocketAddr, limiter: Arc<RateLimiter>, rules: Arc<RuleRegistry>) -> Self {
        Self {
            addr,
            state: AppState::new(limiter, rules),
            enable_reset: false,
        }
    }

    /// Mount the administrative reset endpoint.
    pub fn with_admin_reset(mut self, enabled: bool) -> Self {
        self.enable_reset = enabled;
        self
    }

    /// The router this server would serve.
    pub fn router(&self) -> Router {
        router(self.state.clone(), self.enable_reset)
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            ThrottleError::Io(e)
        })?;

        info!(
            addr = %listener.local_addr()?,
            admin_reset = self.enable_reset,
            "Starting HTTP server with graceful shutdown"
        );

        let app = self.router();
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                ThrottleError::Io(e)
            })
    }
}

//! HTTP server for the SMART-on-FHIR demo.
//!
//! Serves the launch, callback, and status pages over axum. Per-browser
//! state is kept server-side and keyed by a session cookie.

pub mod pages;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;

use crate::config::Config;

pub use routes::{AppState, create_router};

/// The demo web application.
pub struct SmartApp {
    state: Arc<AppState>,
}

impl SmartApp {
    /// Create the application with an in-memory session store.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        Ok(Self { state: Arc::new(AppState::new(config)?) })
    }

    /// The application's router.
    #[must_use]
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.state))
    }

    /// Serve HTTP until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns error on server failure.
    pub async fn run_http(self, port: u16) -> anyhow::Result<()> {
        let settings = &self.state.config.settings;
        tracing::info!(
            port,
            api_base = %settings.api_base,
            redirect_uri = %settings.redirect_uri,
            download_dir = %self.state.fetcher.download_dir().display(),
            confidential = self.state.config.is_confidential(),
            "Starting SMART demo server"
        );

        let router = self.router();
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP server listening on http://{}", addr);

        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        tracing::info!("HTTP server shut down");
        Ok(())
    }
}

impl std::fmt::Debug for SmartApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartApp").field("state", &self.state).finish()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}

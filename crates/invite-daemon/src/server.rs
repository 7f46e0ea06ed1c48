//! Server setup and lifecycle management

use std::sync::Arc;

use invite_tracker::{InMemoryRoleMapping, InviteTracker, RoleGrantingSink};
use tokio::net::TcpListener;

use crate::api::{create_router, AppState};
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::upstream::{HttpInviteSource, HttpRoleGranter, UpstreamClient};

/// Invite attribution daemon
pub struct Server {
    config: DaemonConfig,
    tracker: Arc<InviteTracker>,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        config.validate()?;

        let client = UpstreamClient::new(&config.upstream)?;
        let source = Arc::new(HttpInviteSource::new(client.clone()));
        let granter = Arc::new(HttpRoleGranter::new(client));

        let mapping = Arc::new(InMemoryRoleMapping::from_entries(config.seed_mappings()?));
        tracing::info!(mappings = mapping.len(), "Loaded role mappings");

        let sink = Arc::new(RoleGrantingSink::new(mapping.clone(), granter));
        let tracker = InviteTracker::new(config.tracker.clone(), source, mapping, sink)?;

        Ok(Self {
            config,
            tracker: Arc::new(tracker),
        })
    }

    /// Run the server
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;

        if self.config.server.bootstrap {
            match self.tracker.bootstrap().await {
                Ok(report) => tracing::info!(
                    observed = report.observed.len(),
                    failed = report.failed.len(),
                    "Startup invite caching complete"
                ),
                Err(e) => tracing::warn!(
                    error = %e,
                    "Could not list communities; they will be observed as events arrive"
                ),
            }
        }

        let state = AppState::new(self.tracker.clone(), &self.config.server.api_token);
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Invite daemon listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("Invite daemon shutting down");

        self.tracker.shutdown().await;

        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

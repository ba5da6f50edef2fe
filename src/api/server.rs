//! API Server
//!
//! HTTP listener for the settlement core with graceful shutdown.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::config::{LoggingConfig, ServerConfig};
use crate::orchestrator::SettlementOrchestrator;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Install the global `tracing` subscriber. `RUST_LOG` wins over the configured filter.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.filter));

    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        warn!("tracing subscriber already installed");
    }
}

/// Build the router with the full middleware stack
pub fn create_app(orchestrator: Arc<SettlementOrchestrator>, config: &ServerConfig) -> axum::Router {
    let state = Arc::new(AppState {
        orchestrator,
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    create_router(state)
        // Request ID middleware (first for tracing)
        .layer(axum::middleware::from_fn(request_id_middleware))
        // CORS layer (before timeout to handle preflight)
        .layer(create_cors_layer(config.allowed_origins.clone()))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
}

pub struct ApiServer {
    config: ServerConfig,
    orchestrator: Arc<SettlementOrchestrator>,
}

impl ApiServer {
    pub fn new(config: ServerConfig, orchestrator: Arc<SettlementOrchestrator>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    /// Serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = self.get_socket_addr()?;
        let app = create_app(self.orchestrator.clone(), &self.config);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(
            %addr,
            models = self.orchestrator.math_model_ids().len(),
            cors = ?self.config.allowed_origins,
            timeout_secs = self.config.request_timeout_secs,
            "RGS settlement server listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("RGS settlement server stopped");
        Ok(())
    }

    fn get_socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.host.parse::<std::net::IpAddr>()?,
            self.config.port,
        )))
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}

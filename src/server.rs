use crate::api::ImageApi;
use crate::config::Config;
use crate::fetch::FetchError;
use crate::firewall::{BanDispatcher, FirewallError};
use crate::handlers::{health_check, metrics, serve_image, AppState, SharedState};
use crate::health::HealthChecker;
use crate::metrics::MetricsCollector;
use crate::middleware::logging_middleware;
use crate::store::StoreError;
use crate::throttler::Throttler;
use axum::routing::get;
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tokio::signal;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("http client: {0}")]
    Fetch(#[from] FetchError),

    #[error("throttle store: {0}")]
    Store(#[from] StoreError),

    #[error("firewall client: {0}")]
    Firewall(#[from] FirewallError),
}

/// Build the shared state from configuration.
pub fn build_state(config: Config) -> Result<SharedState, StartupError> {
    let throttler = match &config.throttler {
        Some(throttler_config) => {
            let bans = BanDispatcher::from_config(config.firewall.as_ref())?;
            Some(Arc::new(Throttler::from_config(throttler_config.clone(), bans)?))
        }
        None => None,
    };

    Ok(Arc::new(AppState {
        api: ImageApi::new(&config, throttler.clone())?,
        health: HealthChecker::new(throttler),
        metrics: MetricsCollector::new(),
        config: Arc::new(config),
    }))
}

pub fn create_app(state: SharedState) -> Router {
    Router::new()
        .route("/", get(serve_image))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware))
        )
}

pub struct Server {
    state: SharedState,
    throttler: Option<Arc<Throttler>>,
    bind_addr: SocketAddr,
}

impl Server {
    pub fn new(config: Config) -> Result<Self, StartupError> {
        let bind_addr = config.bind_addr;
        let state = build_state(config)?;
        let throttler = state.api.throttler().cloned();
        Ok(Self { state, throttler, bind_addr })
    }

    pub async fn run(self) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        let cleanup = self.throttler.as_ref().and_then(|t| t.spawn_cleanup());
        match &self.throttler {
            Some(throttler) => tracing::info!(
                store = throttler.store_name(),
                "Throttling enabled"
            ),
            None => tracing::info!("Throttling disabled"),
        }

        tracing::info!("Image proxy listening on {}", listener.local_addr()?);
        tracing::info!("Health check available at /health");
        tracing::info!(
            stages = ?self.state.api.pipeline().stage_names(),
            "Manipulation pipeline ready"
        );

        let app = create_app(self.state);
        let result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await;

        if let Some(cleanup) = cleanup {
            cleanup.abort();
        }
        result
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}

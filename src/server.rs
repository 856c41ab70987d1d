//! Pull endpoint for the updater's Prometheus metrics.

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::MetricsServerConfig;
use crate::metrics::MetricsRegistry;
use crate::shutdown::Shutdown;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

pub fn router(registry: MetricsRegistry) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

async fn metrics(State(registry): State<MetricsRegistry>) -> Response {
    match registry.encode_text() {
        Ok(body) => ([(CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub async fn health_check() -> impl IntoResponse {
    "healthy"
}

pub struct MetricsServer {
    listener: TcpListener,
    router: Router,
}

impl MetricsServer {
    pub async fn bind(config: &MetricsServerConfig, registry: MetricsRegistry) -> std::io::Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        Ok(Self {
            listener,
            router: router(registry),
        })
    }

    /// The bound port, useful when configured with port 0.
    pub fn port(&self) -> std::io::Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    pub async fn run(self, mut shutdown: Shutdown) -> std::io::Result<()> {
        info!("Serving metrics on {}", self.listener.local_addr()?);
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    }
}

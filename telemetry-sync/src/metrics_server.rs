use std::net::SocketAddr;

use axum::{http::StatusCode, routing::get, Router};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(thiserror::Error, Debug)]
pub enum MetricsError {
    #[error("failed to install Prometheus recorder: {0}")]
    Recorder(#[from] BuildError),
    #[error("invalid metrics bind address '{addr}': {source}")]
    BindAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

/// Installs the global recorder and serves `/metrics` on `bind_addr`.
pub fn init(bind_addr: &str) -> Result<(), MetricsError> {
    let addr: SocketAddr = bind_addr.parse().map_err(|source| MetricsError::BindAddr {
        addr: bind_addr.to_string(),
        source,
    })?;
    let handle = PrometheusBuilder::new().install_recorder()?;
    // Only the first install wins; later calls keep the original handle.
    let _ = PROM_HANDLE.set(handle);

    tokio::spawn(async move {
        let app = Router::new().route("/metrics", get(metrics_handler));

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                tracing::info!(%addr, "metrics listener started");
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    tracing::error!(error = %e, "metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to bind metrics listener");
            }
        }
    });
    Ok(())
}

async fn metrics_handler() -> Result<String, StatusCode> {
    PROM_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

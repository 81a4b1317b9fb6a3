use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use telemetry_sync::{
    api::{self, ApiState},
    config::AppConfig,
    metrics_server, observability,
    store::PgPropertyStore,
    timeseries::InfluxClient,
    Reconciler,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let pool = PgPoolOptions::new()
        .max_connections(cfg.postgres.max_connections)
        .connect(&cfg.postgres.uri)
        .await?;
    let influx = InfluxClient::new(&cfg.influx)?;

    let shutdown = CancellationToken::new();
    let reconciler = Reconciler::new(
        Arc::new(PgPropertyStore::new(pool)),
        Arc::new(influx),
        cfg.sync.clone(),
        shutdown.clone(),
    );
    let app = api::router(ApiState {
        reconciler: Arc::new(reconciler),
        auth_token: cfg.http.auth_bearer_token.clone(),
    });

    let addr: SocketAddr = cfg
        .http
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid http.bind_addr: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "telemetry sync API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown requested, cancelling in-flight operations");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

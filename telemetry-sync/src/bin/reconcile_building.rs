//! One-shot reconciliation from the command line.
//!
//! ```text
//! reconcile_building fetch <building-id> [--with-readings]
//! reconcile_building reload <building-id>
//! reconcile_building delete <building-id>
//! reconcile_building sync-meter <meter-id>
//! reconcile_building sync-unit <unit-id>
//! ```
//!
//! The report is printed to stdout as JSON.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use sqlx::postgres::PgPoolOptions;
use telemetry_sync::{config::AppConfig, observability, store::PgPropertyStore, timeseries::InfluxClient, Reconciler};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const USAGE: &str = "usage: reconcile_building <fetch|reload|delete|sync-meter|sync-unit> <uuid> [--with-readings]";

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, id) = match args.as_slice() {
        [command, id, ..] => (command.as_str(), id.as_str()),
        _ => bail!(USAGE),
    };
    let id: Uuid = id.parse().with_context(|| format!("invalid id '{id}'"))?;
    let with_readings = args.iter().any(|a| a == "--with-readings");

    let cfg = AppConfig::load()?;
    let pool = PgPoolOptions::new()
        .max_connections(cfg.postgres.max_connections)
        .connect(&cfg.postgres.uri)
        .await?;

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let reconciler = Reconciler::new(
        Arc::new(PgPropertyStore::new(pool)),
        Arc::new(InfluxClient::new(&cfg.influx)?),
        cfg.sync.clone(),
        shutdown,
    );

    let report = match command {
        "fetch" => serde_json::to_string_pretty(&reconciler.fetch_units(id, with_readings).await?)?,
        "reload" => serde_json::to_string_pretty(&reconciler.reload_units(id).await?)?,
        "delete" => serde_json::to_string_pretty(&reconciler.delete_units(id).await?)?,
        "sync-meter" => serde_json::to_string_pretty(&reconciler.sync_meter_readings(id).await?)?,
        "sync-unit" => serde_json::to_string_pretty(&reconciler.sync_unit_readings(id).await?)?,
        other => bail!("unknown command '{other}'\n{USAGE}"),
    };
    println!("{report}");

    Ok(())
}

use std::collections::HashSet;

use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::NewReading;

/// Postgres caps bind parameters per statement at 65535; four binds per row.
const INSERT_CHUNK: usize = 10_000;

/// Timestamps that already have a reading (manual or imported) for a meter.
pub async fn reading_times(pool: &PgPool, meter_id: Uuid) -> Result<HashSet<OffsetDateTime>, sqlx::Error> {
    let rows: Vec<(OffsetDateTime,)> = sqlx::query_as("SELECT time FROM meter_readings WHERE meter_id = $1")
        .bind(meter_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|(t,)| t).collect())
}

/// Inserts imported readings for one meter in a single transaction and returns
/// the number of rows written. Rows colliding with the
/// `(meter_id, time) WHERE NOT is_manual` unique index are ignored.
pub async fn insert_readings(pool: &PgPool, meter_id: Uuid, readings: &[NewReading]) -> Result<u64, sqlx::Error> {
    if readings.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for chunk in readings.chunks(INSERT_CHUNK) {
        let mut builder =
            QueryBuilder::<Postgres>::new("INSERT INTO meter_readings (meter_id, value, time, is_manual) ");
        builder.push_values(chunk, |mut b, r| {
            b.push_bind(meter_id).push_bind(r.value).push_bind(r.time).push_bind(false);
        });
        builder.push(" ON CONFLICT DO NOTHING");

        inserted += builder.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

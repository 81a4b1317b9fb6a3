use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Meter, NewMeter};

pub async fn get_meter(pool: &PgPool, meter_id: Uuid) -> Result<Option<Meter>, sqlx::Error> {
    sqlx::query_as::<_, Meter>(
        r#"
        SELECT id, unit_id, serial_number, type, unit_of_measure
        FROM meters
        WHERE id = $1
        "#,
    )
    .bind(meter_id)
    .fetch_optional(pool)
    .await
}

/// Serial numbers are unique across the whole store, so this is the global
/// identity lookup.
pub async fn find_meter_by_serial(pool: &PgPool, serial_number: &str) -> Result<Option<Meter>, sqlx::Error> {
    sqlx::query_as::<_, Meter>(
        r#"
        SELECT id, unit_id, serial_number, type, unit_of_measure
        FROM meters
        WHERE serial_number = $1
        "#,
    )
    .bind(serial_number)
    .fetch_optional(pool)
    .await
}

pub async fn list_unit_meters(pool: &PgPool, unit_id: Uuid) -> Result<Vec<Meter>, sqlx::Error> {
    sqlx::query_as::<_, Meter>(
        r#"
        SELECT id, unit_id, serial_number, type, unit_of_measure
        FROM meters
        WHERE unit_id = $1
        ORDER BY serial_number
        "#,
    )
    .bind(unit_id)
    .fetch_all(pool)
    .await
}

pub async fn insert_meter(pool: &PgPool, meter: &NewMeter) -> Result<Meter, sqlx::Error> {
    sqlx::query_as::<_, Meter>(
        r#"
        INSERT INTO meters (id, unit_id, serial_number, type, unit_of_measure)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, unit_id, serial_number, type, unit_of_measure
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(meter.unit_id)
    .bind(&meter.serial_number)
    .bind(meter.kind.as_str())
    .bind(&meter.unit_of_measure)
    .fetch_one(pool)
    .await
}

pub async fn move_meter(pool: &PgPool, meter_id: Uuid, unit_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE meters SET unit_id = $2 WHERE id = $1")
        .bind(meter_id)
        .bind(unit_id)
        .execute(pool)
        .await
        .map(|_| ())
}

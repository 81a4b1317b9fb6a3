use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::Building;

pub async fn get_building(pool: &PgPool, building_id: Uuid) -> Result<Option<Building>, sqlx::Error> {
    sqlx::query_as::<_, Building>(
        r#"
        SELECT
            id,
            name,
            address,
            description,
            influx_db_name,
            influx_unit_tag,
            influx_device_tag,
            influx_measurements,
            units_fetched
        FROM buildings
        WHERE id = $1
        "#,
    )
    .bind(building_id)
    .fetch_optional(pool)
    .await
}

pub async fn set_units_fetched(pool: &PgPool, building_id: Uuid, fetched: bool) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE buildings SET units_fetched = $2 WHERE id = $1")
        .bind(building_id)
        .bind(fetched)
        .execute(pool)
        .await
        .map(|_| ())
}

/// Rows removed by [`purge_building_units`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgedRows {
    pub readings: u64,
    pub meters: u64,
    pub units: u64,
}

/// Deletes every reading, meter and unit under a building, deepest first, in
/// one transaction, and clears `units_fetched`.
pub async fn purge_building_units(pool: &PgPool, building_id: Uuid) -> Result<PurgedRows, sqlx::Error> {
    let mut tx: Transaction<'_, Postgres> = pool.begin().await?;

    let readings = sqlx::query(
        r#"
        DELETE FROM meter_readings
        WHERE meter_id IN (
            SELECT m.id
            FROM meters m
            JOIN units u ON m.unit_id = u.id
            WHERE u.building_id = $1
        )
        "#,
    )
    .bind(building_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let meters = sqlx::query(
        r#"
        DELETE FROM meters
        WHERE unit_id IN (SELECT id FROM units WHERE building_id = $1)
        "#,
    )
    .bind(building_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let units = sqlx::query("DELETE FROM units WHERE building_id = $1")
        .bind(building_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query("UPDATE buildings SET units_fetched = FALSE WHERE id = $1")
        .bind(building_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(PurgedRows {
        readings,
        meters,
        units,
    })
}

use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{NewUnit, Unit};

pub async fn get_unit(pool: &PgPool, unit_id: Uuid) -> Result<Option<Unit>, sqlx::Error> {
    sqlx::query_as::<_, Unit>(
        r#"
        SELECT id, building_id, unit_number, floor, area_m2, owner_id
        FROM units
        WHERE id = $1
        "#,
    )
    .bind(unit_id)
    .fetch_optional(pool)
    .await
}

/// Looks a unit up by its natural key.
pub async fn find_unit(pool: &PgPool, building_id: Uuid, unit_number: &str) -> Result<Option<Unit>, sqlx::Error> {
    sqlx::query_as::<_, Unit>(
        r#"
        SELECT id, building_id, unit_number, floor, area_m2, owner_id
        FROM units
        WHERE building_id = $1
          AND unit_number = $2
        "#,
    )
    .bind(building_id)
    .bind(unit_number)
    .fetch_optional(pool)
    .await
}

pub async fn insert_unit(pool: &PgPool, unit: &NewUnit) -> Result<Unit, sqlx::Error> {
    sqlx::query_as::<_, Unit>(
        r#"
        INSERT INTO units (id, building_id, unit_number, floor, area_m2, owner_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, building_id, unit_number, floor, area_m2, owner_id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(unit.building_id)
    .bind(&unit.unit_number)
    .bind(unit.floor)
    .bind(unit.area_m2)
    .bind(unit.owner_id)
    .fetch_one(pool)
    .await
}

/// `unit_number -> owner_id` for every owned unit of a building.
pub async fn owner_snapshot(pool: &PgPool, building_id: Uuid) -> Result<HashMap<String, Uuid>, sqlx::Error> {
    let rows: Vec<(String, Uuid)> = sqlx::query_as(
        r#"
        SELECT unit_number, owner_id
        FROM units
        WHERE building_id = $1
          AND owner_id IS NOT NULL
        "#,
    )
    .bind(building_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}

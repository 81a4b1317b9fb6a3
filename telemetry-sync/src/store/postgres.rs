use std::collections::{HashMap, HashSet};

use property_client::{
    db::{building_queries, meter_queries, reading_queries, unit_queries, PurgedRows},
    domain::{Building, Meter, NewMeter, NewReading, NewUnit, Unit},
};
use sqlx::postgres::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::PropertyStore;

#[derive(Clone)]
pub struct PgPropertyStore {
    pool: PgPool,
}

impl PgPropertyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PropertyStore for PgPropertyStore {
    async fn get_building(&self, building_id: Uuid) -> Result<Option<Building>, sqlx::Error> {
        building_queries::get_building(&self.pool, building_id).await
    }

    async fn set_units_fetched(&self, building_id: Uuid, fetched: bool) -> Result<(), sqlx::Error> {
        building_queries::set_units_fetched(&self.pool, building_id, fetched).await
    }

    async fn get_unit(&self, unit_id: Uuid) -> Result<Option<Unit>, sqlx::Error> {
        unit_queries::get_unit(&self.pool, unit_id).await
    }

    async fn find_unit(&self, building_id: Uuid, unit_number: &str) -> Result<Option<Unit>, sqlx::Error> {
        unit_queries::find_unit(&self.pool, building_id, unit_number).await
    }

    async fn insert_unit(&self, unit: &NewUnit) -> Result<Unit, sqlx::Error> {
        unit_queries::insert_unit(&self.pool, unit).await
    }

    async fn owner_snapshot(&self, building_id: Uuid) -> Result<HashMap<String, Uuid>, sqlx::Error> {
        unit_queries::owner_snapshot(&self.pool, building_id).await
    }

    async fn get_meter(&self, meter_id: Uuid) -> Result<Option<Meter>, sqlx::Error> {
        meter_queries::get_meter(&self.pool, meter_id).await
    }

    async fn find_meter_by_serial(&self, serial_number: &str) -> Result<Option<Meter>, sqlx::Error> {
        meter_queries::find_meter_by_serial(&self.pool, serial_number).await
    }

    async fn list_unit_meters(&self, unit_id: Uuid) -> Result<Vec<Meter>, sqlx::Error> {
        meter_queries::list_unit_meters(&self.pool, unit_id).await
    }

    async fn insert_meter(&self, meter: &NewMeter) -> Result<Meter, sqlx::Error> {
        meter_queries::insert_meter(&self.pool, meter).await
    }

    async fn move_meter(&self, meter_id: Uuid, unit_id: Uuid) -> Result<(), sqlx::Error> {
        meter_queries::move_meter(&self.pool, meter_id, unit_id).await
    }

    async fn reading_times(&self, meter_id: Uuid) -> Result<HashSet<OffsetDateTime>, sqlx::Error> {
        reading_queries::reading_times(&self.pool, meter_id).await
    }

    async fn insert_readings(&self, meter_id: Uuid, readings: &[NewReading]) -> Result<u64, sqlx::Error> {
        reading_queries::insert_readings(&self.pool, meter_id, readings).await
    }

    async fn purge_building_units(&self, building_id: Uuid) -> Result<PurgedRows, sqlx::Error> {
        building_queries::purge_building_units(&self.pool, building_id).await
    }
}

//! The relational side of reconciliation.

pub mod postgres;

use std::collections::{HashMap, HashSet};

use property_client::{
    db::PurgedRows,
    domain::{Building, Meter, NewMeter, NewReading, NewUnit, Unit},
};
use time::OffsetDateTime;
use uuid::Uuid;

pub use postgres::PgPropertyStore;

/// Row-level operations the engine needs. Each call commits on its own;
/// `insert_readings` and `purge_building_units` are single transactions.
#[async_trait::async_trait]
pub trait PropertyStore: Send + Sync {
    async fn get_building(&self, building_id: Uuid) -> Result<Option<Building>, sqlx::Error>;
    async fn set_units_fetched(&self, building_id: Uuid, fetched: bool) -> Result<(), sqlx::Error>;

    async fn get_unit(&self, unit_id: Uuid) -> Result<Option<Unit>, sqlx::Error>;
    async fn find_unit(&self, building_id: Uuid, unit_number: &str) -> Result<Option<Unit>, sqlx::Error>;
    async fn insert_unit(&self, unit: &NewUnit) -> Result<Unit, sqlx::Error>;
    async fn owner_snapshot(&self, building_id: Uuid) -> Result<HashMap<String, Uuid>, sqlx::Error>;

    async fn get_meter(&self, meter_id: Uuid) -> Result<Option<Meter>, sqlx::Error>;
    async fn find_meter_by_serial(&self, serial_number: &str) -> Result<Option<Meter>, sqlx::Error>;
    async fn list_unit_meters(&self, unit_id: Uuid) -> Result<Vec<Meter>, sqlx::Error>;
    async fn insert_meter(&self, meter: &NewMeter) -> Result<Meter, sqlx::Error>;
    async fn move_meter(&self, meter_id: Uuid, unit_id: Uuid) -> Result<(), sqlx::Error>;

    async fn reading_times(&self, meter_id: Uuid) -> Result<HashSet<OffsetDateTime>, sqlx::Error>;
    async fn insert_readings(&self, meter_id: Uuid, readings: &[NewReading]) -> Result<u64, sqlx::Error>;

    async fn purge_building_units(&self, building_id: Uuid) -> Result<PurgedRows, sqlx::Error>;
}

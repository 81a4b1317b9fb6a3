//! Query functions against the property schema in `sql/schema.sql`.

pub mod building_queries;
pub mod meter_queries;
pub mod reading_queries;
pub mod unit_queries;

pub use building_queries::PurgedRows;

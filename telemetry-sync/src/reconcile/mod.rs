//! Reconciliation of the property store against building telemetry.

pub mod discovery;
pub mod measurements;
pub mod orchestrator;
pub mod prober;
pub mod readings;

use std::fmt;

use property_client::domain::Building;
use serde::Serialize;
use uuid::Uuid;

use crate::{config::SyncConfig, error::SyncError};

pub use measurements::{parse_measurements, MeasurementSet, MeasurementSpec};
pub use orchestrator::Reconciler;
pub use prober::{ProbeHit, TagProber};

/// Why a single item was left out of a pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    Transport(String),
    BadTimestamp(String),
    BadValue(String),
    OutOfRange(String),
    MalformedConfig(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::BadTimestamp(raw) => write!(f, "unparseable timestamp {raw}"),
            Self::BadValue(raw) => write!(f, "unusable value {raw}"),
            Self::OutOfRange(ts) => write!(f, "timestamp {ts} outside accepted window"),
            Self::MalformedConfig(entry) => write!(f, "malformed measurement entry '{entry}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Skipped {
    /// The query, point or config entry that was skipped.
    pub item: String,
    pub reason: SkipReason,
}

impl Skipped {
    pub fn new(item: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            item: item.into(),
            reason,
        }
    }
}

/// Result of `fetch_units` / `reload_units`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub units_created: usize,
    pub meters_connected: usize,
    pub units_found: usize,
    pub units_fetched: bool,
    pub owners_restored: usize,
    pub readings_synced: u64,
    pub skipped: Vec<Skipped>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadingsReport {
    pub meters_synced: usize,
    pub readings_synced: u64,
    pub skipped: Vec<Skipped>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeleteReport {
    pub deleted_units: u64,
    pub deleted_meters: u64,
    pub deleted_readings: u64,
    pub units_fetched: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Discovering,
    PersistingUnits,
    PersistingMeters,
    Syncing,
    Done,
    Failed,
}

/// Everything a pass needs to know about one building's telemetry layout.
#[derive(Debug, Clone)]
pub struct BuildingProfile {
    pub building_id: Uuid,
    pub database: String,
    pub measurements: MeasurementSet,
    pub unit_tags: Vec<String>,
    pub device_tags: Vec<String>,
    pub value_field: String,
}

impl BuildingProfile {
    /// Fails with [`SyncError::MissingDatabase`] when the building has no
    /// time-series database; per-building tag overrides replace the
    /// configured candidate lists entirely.
    pub fn resolve(building: &Building, cfg: &SyncConfig) -> Result<Self, SyncError> {
        let database = building
            .database()
            .ok_or(SyncError::MissingDatabase(building.id))?
            .to_string();

        let unit_tags = match building.unit_tag_override() {
            Some(tag) => vec![tag.to_string()],
            None => cfg.unit_tag_candidates.clone(),
        };
        let device_tags = match building.device_tag_override() {
            Some(tag) => vec![tag.to_string()],
            None => cfg.device_tag_candidates.clone(),
        };

        Ok(Self {
            building_id: building.id,
            database,
            measurements: parse_measurements(building.influx_measurements.as_deref()),
            unit_tags,
            device_tags,
            value_field: cfg.value_field.clone(),
        })
    }
}

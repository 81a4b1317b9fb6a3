use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MeterReading {
    pub id: i64,
    pub meter_id: Uuid,
    pub value: f64,
    pub time: OffsetDateTime,
    pub is_manual: bool,
}

/// A reading imported from telemetry; always stored with `is_manual = false`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewReading {
    pub time: OffsetDateTime,
    pub value: f64,
}

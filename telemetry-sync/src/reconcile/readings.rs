use property_client::domain::{Meter, NewReading};
use serde_json::Value;
use time::{format_description::well_known::Rfc3339, macros::datetime, OffsetDateTime};

use crate::{error::SyncError, store::PropertyStore, timeseries::influxql};

use super::{BuildingProfile, SkipReason, Skipped, TagProber};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterSyncOutcome {
    pub inserted: u64,
    /// Measurement the meter's points came from, if any.
    pub measurement: Option<String>,
    pub skipped: Vec<Skipped>,
}

/// Turns one `[time, value]` row into a reading.
///
/// Rules:
/// - time must be RFC 3339, and is truncated to microseconds (what
///   `timestamptz` keeps);
/// - value must be a finite number (numeric strings are accepted);
/// - time must be within the sanity window [2000-01-01, 2100-01-01).
pub fn parse_point(row: &[Value]) -> Result<NewReading, SkipReason> {
    let raw_time = row.first().cloned().unwrap_or(Value::Null);
    let time = raw_time
        .as_str()
        .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
        .and_then(|t| t.replace_nanosecond(t.nanosecond() / 1_000 * 1_000).ok())
        .ok_or_else(|| SkipReason::BadTimestamp(raw_time.to_string()))?;

    let raw_value = row.get(1).cloned().unwrap_or(Value::Null);
    let value = match &raw_value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
    .ok_or_else(|| SkipReason::BadValue(raw_value.to_string()))?;

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);
    if time < min_ts || time >= max_ts {
        return Err(SkipReason::OutOfRange(raw_time.to_string()));
    }

    Ok(NewReading { time, value })
}

/// Imports readings for one meter.
///
/// Measurements are probed in configuration order and the first one that
/// returns points for the serial is the only one used. Points already present
/// for `(meter, time)` are skipped; the rest commit in one transaction.
pub async fn sync_meter(
    prober: &TagProber,
    store: &dyn PropertyStore,
    profile: &BuildingProfile,
    meter: &Meter,
) -> Result<MeterSyncOutcome, SyncError> {
    let mut outcome = MeterSyncOutcome::default();
    let serial = meter.serial_number.as_str();

    let mut hit = None;
    for spec in profile.measurements.iter() {
        let measurement = spec.name.as_str();
        let found = prober
            .find_identity_tag(
                &profile.database,
                measurement,
                &profile.device_tags,
                |tag| influxql::select_field(measurement, &profile.value_field, tag, serial),
                &mut outcome.skipped,
            )
            .await?;
        if let Some(found) = found {
            outcome.measurement = Some(spec.name.clone());
            hit = Some(found);
            break;
        }
    }

    let Some(hit) = hit else {
        tracing::debug!(serial, "no telemetry found for meter");
        return Ok(outcome);
    };

    let mut known = store.reading_times(meter.id).await?;
    let mut fresh = Vec::new();
    for row in hit.response.rows() {
        match parse_point(row) {
            Ok(reading) => {
                if known.insert(reading.time) {
                    fresh.push(reading);
                }
            }
            Err(reason) => {
                metrics::counter!("reading_points_skipped_total").increment(1);
                let at = row.first().unwrap_or(&Value::Null);
                outcome.skipped.push(Skipped::new(format!("{serial}@{at}"), reason));
            }
        }
    }

    if !outcome.skipped.is_empty() {
        tracing::warn!(serial, skipped = outcome.skipped.len(), "some telemetry points were skipped");
    }

    outcome.inserted = store.insert_readings(meter.id, &fresh).await?;
    metrics::counter!("readings_inserted_total").increment(outcome.inserted);
    tracing::debug!(
        serial,
        measurement = ?outcome.measurement,
        tag = %hit.key,
        inserted = outcome.inserted,
        "meter readings synced"
    );

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use property_client::domain::{MeterKind, NewMeter, NewUnit};
    use serde_json::json;
    use time::macros::datetime;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        config::SyncConfig,
        test_support::{building, FakeTimeSeries, MemoryStore},
    };

    #[test]
    fn parse_point_accepts_rfc3339_and_numbers() {
        let r = parse_point(&[json!("2024-03-01T10:00:00Z"), json!(12.5)]).unwrap();
        assert_eq!(r.time, datetime!(2024-03-01 10:00:00 UTC));
        assert_eq!(r.value, 12.5);

        let r = parse_point(&[json!("2024-03-01T10:00:00.123456789Z"), json!("7")]).unwrap();
        assert_eq!(r.value, 7.0);
        assert_eq!(r.time, datetime!(2024-03-01 10:00:00.123456 UTC));
    }

    #[test]
    fn parse_point_rejects_bad_rows() {
        assert!(matches!(
            parse_point(&[json!("yesterday"), json!(1.0)]),
            Err(SkipReason::BadTimestamp(_))
        ));
        assert!(matches!(parse_point(&[json!(1_700_000_000), json!(1.0)]), Err(SkipReason::BadTimestamp(_))));
        assert!(matches!(
            parse_point(&[json!("2024-03-01T10:00:00Z"), Value::Null]),
            Err(SkipReason::BadValue(_))
        ));
        assert!(matches!(
            parse_point(&[json!("1999-12-31T23:59:59Z"), json!(1.0)]),
            Err(SkipReason::OutOfRange(_))
        ));
    }

    async fn fixture(config: Option<&str>) -> (Arc<FakeTimeSeries>, Arc<MemoryStore>, BuildingProfile, Meter) {
        let ts = Arc::new(FakeTimeSeries::default());
        let store = Arc::new(MemoryStore::default());
        let mut b = building(Some("svjdb"));
        b.influx_measurements = config.map(String::from);
        store.add_building(b.clone());
        let unit = store.insert_unit(&NewUnit::discovered(b.id, "A1")).await.unwrap();
        let meter = store
            .insert_meter(&NewMeter {
                unit_id: unit.id,
                serial_number: "SN-1".to_string(),
                kind: MeterKind::WaterCold,
                unit_of_measure: "m3".to_string(),
            })
            .await
            .unwrap();
        let profile = BuildingProfile::resolve(&b, &SyncConfig::default()).unwrap();
        (ts, store, profile, meter)
    }

    #[tokio::test]
    async fn second_sync_inserts_nothing() {
        let (ts, store, profile, meter) = fixture(None).await;
        ts.points(
            "sv_l",
            "value",
            "sn",
            "SN-1",
            &[
                ("2024-01-01T00:00:00Z", json!(1.0)),
                ("2024-01-02T00:00:00Z", json!(2.0)),
                ("2024-01-02T00:00:00Z", json!(2.0)),
            ],
        );
        let prober = TagProber::new(ts, CancellationToken::new());

        let first = sync_meter(&prober, store.as_ref(), &profile, &meter).await.unwrap();
        assert_eq!(first.inserted, 2);
        assert_eq!(first.measurement.as_deref(), Some("sv_l"));

        let second = sync_meter(&prober, store.as_ref(), &profile, &meter).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(store.readings(meter.id).len(), 2);
    }

    #[tokio::test]
    async fn bad_points_are_skipped_without_aborting_the_batch() {
        let (ts, store, profile, meter) = fixture(None).await;
        ts.points(
            "sv_l",
            "value",
            "serial",
            "SN-1",
            &[
                ("2024-01-01T00:00:00Z", json!(1.0)),
                ("not-a-time", json!(2.0)),
                ("2024-01-03T00:00:00Z", json!(3.0)),
            ],
        );
        let prober = TagProber::new(ts, CancellationToken::new());

        let outcome = sync_meter(&prober, store.as_ref(), &profile, &meter).await.unwrap();
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.skipped.len(), 1);
        assert!(matches!(outcome.skipped[0].reason, SkipReason::BadTimestamp(_)));
    }

    #[tokio::test]
    async fn only_the_first_measurement_with_points_is_used() {
        let (ts, store, profile, meter) = fixture(None).await;
        ts.points("tv_l", "value", "sn", "SN-1", &[("2024-01-01T00:00:00Z", json!(5.0))]);
        ts.points("teplo_kWh", "value", "sn", "SN-1", &[("2024-01-01T01:00:00Z", json!(9.0))]);
        let prober = TagProber::new(ts.clone(), CancellationToken::new());

        let outcome = sync_meter(&prober, store.as_ref(), &profile, &meter).await.unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.measurement.as_deref(), Some("tv_l"));
        assert!(!ts.queries().iter().any(|q| q.contains("teplo_kWh")));
    }

    #[tokio::test]
    async fn manual_reading_at_same_instant_blocks_import() {
        let (ts, store, profile, meter) = fixture(None).await;
        store.add_manual_reading(meter.id, datetime!(2024-01-01 00:00:00 UTC), 0.5);
        ts.points("sv_l", "value", "sn", "SN-1", &[("2024-01-01T00:00:00Z", json!(1.0))]);
        let prober = TagProber::new(ts, CancellationToken::new());

        let outcome = sync_meter(&prober, store.as_ref(), &profile, &meter).await.unwrap();
        assert_eq!(outcome.inserted, 0);
        assert_eq!(store.readings(meter.id).len(), 1);
    }

    #[tokio::test]
    async fn meter_without_telemetry_syncs_nothing() {
        let (ts, store, profile, meter) = fixture(Some("sv_l[m3]")).await;
        let prober = TagProber::new(ts, CancellationToken::new());

        let outcome = sync_meter(&prober, store.as_ref(), &profile, &meter).await.unwrap();
        assert_eq!(outcome, MeterSyncOutcome::default());
    }

    #[tokio::test]
    async fn points_apart_by_less_than_a_microsecond_are_one_reading() {
        let (ts, store, profile, meter) = fixture(None).await;
        ts.points(
            "sv_l",
            "value",
            "sn",
            "SN-1",
            &[
                ("2024-01-01T00:00:00.000001100Z", json!(1.0)),
                ("2024-01-01T00:00:00.000001900Z", json!(1.5)),
            ],
        );
        let prober = TagProber::new(ts, CancellationToken::new());

        let outcome = sync_meter(&prober, store.as_ref(), &profile, &meter).await.unwrap();
        assert_eq!(outcome.inserted, 1);
        let stored = store.readings(meter.id);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].time, datetime!(2024-01-01 00:00:00.000001 UTC));
    }

    #[tokio::test]
    async fn manual_reading_blocks_a_point_differing_below_a_microsecond() {
        let (ts, store, profile, meter) = fixture(None).await;
        store.add_manual_reading(meter.id, datetime!(2024-01-01 00:00:00.5 UTC), 0.5);
        ts.points("sv_l", "value", "sn", "SN-1", &[("2024-01-01T00:00:00.500000300Z", json!(1.0))]);
        let prober = TagProber::new(ts, CancellationToken::new());

        let outcome = sync_meter(&prober, store.as_ref(), &profile, &meter).await.unwrap();
        assert_eq!(outcome.inserted, 0);
        assert_eq!(store.readings(meter.id).len(), 1);
    }
}

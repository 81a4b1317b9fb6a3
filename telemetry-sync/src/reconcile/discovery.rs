use std::collections::{BTreeSet, HashSet};

use property_client::domain::MeterKind;

use crate::{error::SyncError, timeseries::influxql};

use super::{BuildingProfile, Skipped, TagProber};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredMeter {
    pub serial_number: String,
    pub kind: MeterKind,
    pub unit_of_measure: String,
    /// Measurement the serial was found under.
    pub measurement: String,
}

/// Distinct unit identifiers from the reference measurement, unioned over
/// every unit tag candidate. Values are compared exactly, not normalised.
pub async fn discover_units(
    prober: &TagProber,
    profile: &BuildingProfile,
    skipped: &mut Vec<Skipped>,
) -> Result<BTreeSet<String>, SyncError> {
    let mut units = BTreeSet::new();
    let Some(reference) = profile.measurements.reference() else {
        return Ok(units);
    };

    for tag in &profile.unit_tags {
        let q = influxql::show_tag_values(&reference.name, tag, None);
        let resp = prober.query(&profile.database, &q, skipped).await?;
        units.extend(resp.tag_values());
    }

    tracing::debug!(
        building_id = %profile.building_id,
        measurement = %reference.name,
        units = units.len(),
        "discovered units"
    );
    Ok(units)
}

/// Meters reporting for `unit_number`, one entry per (measurement, serial).
pub async fn discover_meters(
    prober: &TagProber,
    profile: &BuildingProfile,
    unit_number: &str,
    skipped: &mut Vec<Skipped>,
) -> Result<Vec<DiscoveredMeter>, SyncError> {
    let mut meters = Vec::new();

    for spec in profile.measurements.iter() {
        let measurement = spec.name.as_str();

        // Which unit tag carries this unit in this measurement.
        let unit_hit = prober
            .find_identity_tag(
                &profile.database,
                measurement,
                &profile.unit_tags,
                |tag| influxql::show_tag_values(measurement, tag, Some((tag, unit_number))),
                skipped,
            )
            .await?;
        let Some(unit_hit) = unit_hit else {
            continue;
        };
        let unit_tag = unit_hit.key.as_str();

        let device_hit = prober
            .find_identity_tag(
                &profile.database,
                measurement,
                &profile.device_tags,
                |tag| influxql::show_tag_values(measurement, tag, Some((unit_tag, unit_number))),
                skipped,
            )
            .await?;
        let Some(device_hit) = device_hit else {
            tracing::debug!(measurement, unit = unit_number, "no device tag matched");
            continue;
        };

        let mut seen = HashSet::new();
        for serial in device_hit.response.tag_values() {
            if seen.insert(serial.clone()) {
                meters.push(DiscoveredMeter {
                    serial_number: serial,
                    kind: spec.kind,
                    unit_of_measure: spec.unit_of_measure.clone(),
                    measurement: spec.name.clone(),
                });
            }
        }
    }

    Ok(meters)
}

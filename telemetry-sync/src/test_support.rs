//! In-memory stand-ins for the property store and InfluxDB.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use property_client::{
    db::PurgedRows,
    domain::{Building, Meter, MeterReading, NewMeter, NewReading, NewUnit, Unit},
};
use serde_json::{json, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::TransportError,
    store::PropertyStore,
    timeseries::{influxql, QueryResponse, Series, StatementResult, TimeSeriesStore},
};

pub fn building(db_name: Option<&str>) -> Building {
    Building {
        id: Uuid::new_v4(),
        name: "Nuselska 731".to_string(),
        address: "Nuselska 731, Praha".to_string(),
        description: None,
        influx_db_name: db_name.map(String::from),
        influx_unit_tag: None,
        influx_device_tag: None,
        influx_measurements: None,
        units_fetched: false,
    }
}

/// Answers queries from a table keyed by the exact InfluxQL text; anything
/// not scripted comes back with no series.
#[derive(Default)]
pub struct FakeTimeSeries {
    responses: Mutex<HashMap<String, Option<QueryResponse>>>,
    log: Mutex<Vec<String>>,
}

impl FakeTimeSeries {
    fn script(&self, query: String, response: Option<QueryResponse>) {
        self.responses.lock().unwrap().insert(query, response);
    }

    pub fn tag_values(&self, measurement: &str, key: &str, filter: Option<(&str, &str)>, values: &[&str]) {
        let rows = values.iter().map(|v| vec![json!(key), json!(v)]).collect();
        self.script(
            influxql::show_tag_values(measurement, key, filter),
            Some(response(measurement, &["key", "value"], rows)),
        );
    }

    pub fn points(&self, measurement: &str, field: &str, tag: &str, serial: &str, points: &[(&str, Value)]) {
        let rows = points.iter().map(|(t, v)| vec![json!(t), v.clone()]).collect();
        self.script(
            influxql::select_field(measurement, field, tag, serial),
            Some(response(measurement, &["time", field], rows)),
        );
    }

    /// Makes `query` fail with a transport error.
    pub fn fail(&self, query: String) {
        self.script(query, None);
    }

    pub fn clear(&self) {
        self.responses.lock().unwrap().clear();
    }

    pub fn queries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

fn response(measurement: &str, columns: &[&str], values: Vec<Vec<Value>>) -> QueryResponse {
    QueryResponse {
        results: vec![StatementResult {
            statement_id: 0,
            series: Some(vec![Series {
                name: measurement.to_string(),
                columns: columns.iter().map(|c| c.to_string()).collect(),
                values,
            }]),
            error: None,
        }],
        error: None,
    }
}

#[async_trait::async_trait]
impl TimeSeriesStore for FakeTimeSeries {
    async fn query(&self, _database: &str, query: &str) -> Result<QueryResponse, TransportError> {
        self.log.lock().unwrap().push(query.to_string());
        match self.responses.lock().unwrap().get(query) {
            Some(Some(resp)) => Ok(resp.clone()),
            Some(None) => Err(TransportError::Other("connection refused".to_string())),
            None => Ok(QueryResponse {
                results: vec![StatementResult::default()],
                error: None,
            }),
        }
    }
}

#[derive(Default)]
struct Tables {
    buildings: HashMap<Uuid, Building>,
    units: Vec<Unit>,
    meters: Vec<Meter>,
    readings: Vec<MeterReading>,
    next_reading_id: i64,
}

/// Property store with the same natural-key constraints as the schema.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

fn unique_violation(what: &str) -> sqlx::Error {
    sqlx::Error::Protocol(format!("duplicate key value violates unique constraint on {what}"))
}

impl MemoryStore {
    pub fn add_building(&self, building: Building) {
        self.tables.lock().unwrap().buildings.insert(building.id, building);
    }

    pub fn building(&self, building_id: Uuid) -> Building {
        self.tables.lock().unwrap().buildings[&building_id].clone()
    }

    pub fn units(&self, building_id: Uuid) -> Vec<Unit> {
        let t = self.tables.lock().unwrap();
        t.units.iter().filter(|u| u.building_id == building_id).cloned().collect()
    }

    pub fn unit_by_number(&self, building_id: Uuid, unit_number: &str) -> Option<Unit> {
        self.units(building_id).into_iter().find(|u| u.unit_number == unit_number)
    }

    pub fn set_owner(&self, unit_id: Uuid, owner_id: Option<Uuid>) {
        let mut t = self.tables.lock().unwrap();
        if let Some(u) = t.units.iter_mut().find(|u| u.id == unit_id) {
            u.owner_id = owner_id;
        }
    }

    pub fn meters(&self) -> Vec<Meter> {
        self.tables.lock().unwrap().meters.clone()
    }

    pub fn readings(&self, meter_id: Uuid) -> Vec<MeterReading> {
        let t = self.tables.lock().unwrap();
        t.readings.iter().filter(|r| r.meter_id == meter_id).cloned().collect()
    }

    pub fn add_manual_reading(&self, meter_id: Uuid, time: OffsetDateTime, value: f64) {
        let mut t = self.tables.lock().unwrap();
        t.next_reading_id += 1;
        let id = t.next_reading_id;
        t.readings.push(MeterReading {
            id,
            meter_id,
            value,
            time,
            is_manual: true,
        });
    }
}

#[async_trait::async_trait]
impl PropertyStore for MemoryStore {
    async fn get_building(&self, building_id: Uuid) -> Result<Option<Building>, sqlx::Error> {
        Ok(self.tables.lock().unwrap().buildings.get(&building_id).cloned())
    }

    async fn set_units_fetched(&self, building_id: Uuid, fetched: bool) -> Result<(), sqlx::Error> {
        if let Some(b) = self.tables.lock().unwrap().buildings.get_mut(&building_id) {
            b.units_fetched = fetched;
        }
        Ok(())
    }

    async fn get_unit(&self, unit_id: Uuid) -> Result<Option<Unit>, sqlx::Error> {
        let t = self.tables.lock().unwrap();
        Ok(t.units.iter().find(|u| u.id == unit_id).cloned())
    }

    async fn find_unit(&self, building_id: Uuid, unit_number: &str) -> Result<Option<Unit>, sqlx::Error> {
        Ok(self.unit_by_number(building_id, unit_number))
    }

    async fn insert_unit(&self, unit: &NewUnit) -> Result<Unit, sqlx::Error> {
        let mut t = self.tables.lock().unwrap();
        if t.units
            .iter()
            .any(|u| u.building_id == unit.building_id && u.unit_number == unit.unit_number)
        {
            return Err(unique_violation("units (building_id, unit_number)"));
        }
        let row = Unit {
            id: Uuid::new_v4(),
            building_id: unit.building_id,
            unit_number: unit.unit_number.clone(),
            floor: unit.floor,
            area_m2: unit.area_m2,
            owner_id: unit.owner_id,
        };
        t.units.push(row.clone());
        Ok(row)
    }

    async fn owner_snapshot(&self, building_id: Uuid) -> Result<HashMap<String, Uuid>, sqlx::Error> {
        Ok(self
            .units(building_id)
            .into_iter()
            .filter_map(|u| u.owner_id.map(|o| (u.unit_number, o)))
            .collect())
    }

    async fn get_meter(&self, meter_id: Uuid) -> Result<Option<Meter>, sqlx::Error> {
        let t = self.tables.lock().unwrap();
        Ok(t.meters.iter().find(|m| m.id == meter_id).cloned())
    }

    async fn find_meter_by_serial(&self, serial_number: &str) -> Result<Option<Meter>, sqlx::Error> {
        let t = self.tables.lock().unwrap();
        Ok(t.meters.iter().find(|m| m.serial_number == serial_number).cloned())
    }

    async fn list_unit_meters(&self, unit_id: Uuid) -> Result<Vec<Meter>, sqlx::Error> {
        let t = self.tables.lock().unwrap();
        Ok(t.meters.iter().filter(|m| m.unit_id == unit_id).cloned().collect())
    }

    async fn insert_meter(&self, meter: &NewMeter) -> Result<Meter, sqlx::Error> {
        let mut t = self.tables.lock().unwrap();
        if t.meters.iter().any(|m| m.serial_number == meter.serial_number) {
            return Err(unique_violation("meters (serial_number)"));
        }
        let row = Meter {
            id: Uuid::new_v4(),
            unit_id: meter.unit_id,
            serial_number: meter.serial_number.clone(),
            kind: meter.kind,
            unit_of_measure: meter.unit_of_measure.clone(),
        };
        t.meters.push(row.clone());
        Ok(row)
    }

    async fn move_meter(&self, meter_id: Uuid, unit_id: Uuid) -> Result<(), sqlx::Error> {
        let mut t = self.tables.lock().unwrap();
        if let Some(m) = t.meters.iter_mut().find(|m| m.id == meter_id) {
            m.unit_id = unit_id;
        }
        Ok(())
    }

    async fn reading_times(&self, meter_id: Uuid) -> Result<HashSet<OffsetDateTime>, sqlx::Error> {
        Ok(self.readings(meter_id).into_iter().map(|r| r.time).collect())
    }

    async fn insert_readings(&self, meter_id: Uuid, readings: &[NewReading]) -> Result<u64, sqlx::Error> {
        let mut t = self.tables.lock().unwrap();
        let mut inserted = 0;
        for r in readings {
            let clash = t
                .readings
                .iter()
                .any(|x| x.meter_id == meter_id && x.time == r.time && !x.is_manual);
            if clash {
                continue;
            }
            t.next_reading_id += 1;
            let id = t.next_reading_id;
            t.readings.push(MeterReading {
                id,
                meter_id,
                value: r.value,
                time: r.time,
                is_manual: false,
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn purge_building_units(&self, building_id: Uuid) -> Result<PurgedRows, sqlx::Error> {
        let mut t = self.tables.lock().unwrap();
        let unit_ids: HashSet<Uuid> = t
            .units
            .iter()
            .filter(|u| u.building_id == building_id)
            .map(|u| u.id)
            .collect();
        let meter_ids: HashSet<Uuid> = t
            .meters
            .iter()
            .filter(|m| unit_ids.contains(&m.unit_id))
            .map(|m| m.id)
            .collect();

        let before = (t.readings.len(), t.meters.len(), t.units.len());
        t.readings.retain(|r| !meter_ids.contains(&r.meter_id));
        t.meters.retain(|m| !meter_ids.contains(&m.id));
        t.units.retain(|u| !unit_ids.contains(&u.id));
        if let Some(b) = t.buildings.get_mut(&building_id) {
            b.units_fetched = false;
        }

        Ok(PurgedRows {
            readings: (before.0 - t.readings.len()) as u64,
            meters: (before.1 - t.meters.len()) as u64,
            units: (before.2 - t.units.len()) as u64,
        })
    }
}

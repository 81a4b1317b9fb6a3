use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Instant,
};

use futures::{stream, StreamExt};
use property_client::domain::{Building, Meter, NewMeter, NewUnit, Unit};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use crate::{config::SyncConfig, error::SyncError, store::PropertyStore, timeseries::TimeSeriesStore};

use super::{
    discovery::{self, DiscoveredMeter},
    readings, BuildingProfile, DeleteReport, ReadingsReport, SyncPhase, SyncReport, TagProber,
};

/// Serializes operations that touch one building's units.
#[derive(Default)]
struct BuildingLocks {
    inner: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl BuildingLocks {
    async fn acquire(&self, building_id: Uuid) -> BuildingGuard<'_> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(building_id).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        BuildingGuard {
            locks: self,
            building_id,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Holds a building's lock; the map entry goes away with its last user.
struct BuildingGuard<'a> {
    locks: &'a BuildingLocks,
    building_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for BuildingGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.locks.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Waiters hold their own clone, so a count of one means nobody is queued.
        if map.get(&self.building_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            map.remove(&self.building_id);
        }
    }
}

/// Logs phase transitions of one operation.
struct PhaseTracker {
    operation: &'static str,
    building_id: Uuid,
    phase: SyncPhase,
    started: Instant,
}

impl PhaseTracker {
    fn new(operation: &'static str, building_id: Uuid) -> Self {
        Self {
            operation,
            building_id,
            phase: SyncPhase::Idle,
            started: Instant::now(),
        }
    }

    fn enter(&mut self, next: SyncPhase) {
        if self.phase == next {
            return;
        }
        tracing::debug!(
            operation = self.operation,
            building_id = %self.building_id,
            from = ?self.phase,
            to = ?next,
            "reconcile phase"
        );
        self.phase = next;
    }

    fn finish<T>(mut self, result: Result<T, SyncError>) -> Result<T, SyncError> {
        let elapsed = self.started.elapsed();
        metrics::histogram!("reconcile_duration_seconds", "operation" => self.operation).record(elapsed.as_secs_f64());
        match &result {
            Ok(_) => {
                self.enter(SyncPhase::Done);
                tracing::info!(
                    operation = self.operation,
                    building_id = %self.building_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "reconcile finished"
                );
            }
            Err(e) => {
                let failed_in = self.phase;
                self.enter(SyncPhase::Failed);
                tracing::error!(
                    operation = self.operation,
                    building_id = %self.building_id,
                    phase = ?failed_in,
                    error = %e,
                    "reconcile failed"
                );
            }
        }
        result
    }
}

/// Cancellation scope of one operation; dropping it cancels the token.
struct OperationScope {
    cancel: CancellationToken,
    _guard: DropGuard,
}

/// Entry points of the reconciliation engine.
pub struct Reconciler {
    store: Arc<dyn PropertyStore>,
    timeseries: Arc<dyn TimeSeriesStore>,
    config: SyncConfig,
    shutdown: CancellationToken,
    locks: BuildingLocks,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn PropertyStore>,
        timeseries: Arc<dyn TimeSeriesStore>,
        config: SyncConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            timeseries,
            config,
            shutdown,
            locks: BuildingLocks::default(),
        }
    }

    fn begin(&self) -> OperationScope {
        let cancel = self.shutdown.child_token();
        if let Some(limit) = self.config.operation_timeout() {
            let timer = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        tracing::warn!(timeout_secs = limit.as_secs(), "reconcile operation timed out, cancelling");
                        timer.cancel();
                    }
                    _ = timer.cancelled() => {}
                }
            });
        }
        OperationScope {
            _guard: cancel.clone().drop_guard(),
            cancel,
        }
    }

    fn prober(&self, scope: &OperationScope) -> TagProber {
        TagProber::new(self.timeseries.clone(), scope.cancel.clone())
    }

    async fn load_building(&self, building_id: Uuid) -> Result<Building, SyncError> {
        self.store
            .get_building(building_id)
            .await?
            .ok_or(SyncError::BuildingNotFound(building_id))
    }

    /// Additive sync: creates new units, creates or relocates meters, never
    /// deletes anything. Each unit is committed before the next one is
    /// discovered, so an interrupted fetch keeps what it already wrote.
    pub async fn fetch_units(&self, building_id: Uuid, with_readings: bool) -> Result<SyncReport, SyncError> {
        let mut phase = PhaseTracker::new("fetch_units", building_id);
        let result = self.fetch_inner(building_id, with_readings, &mut phase).await;
        phase.finish(result)
    }

    async fn fetch_inner(
        &self,
        building_id: Uuid,
        with_readings: bool,
        phase: &mut PhaseTracker,
    ) -> Result<SyncReport, SyncError> {
        let _lock = self.locks.acquire(building_id).await;
        let building = self.load_building(building_id).await?;
        let profile = BuildingProfile::resolve(&building, &self.config)?;
        let scope = self.begin();
        let prober = self.prober(&scope);

        let mut report = SyncReport {
            skipped: profile.measurements.skipped(),
            units_fetched: building.units_fetched,
            ..SyncReport::default()
        };

        phase.enter(SyncPhase::Discovering);
        let unit_numbers = discovery::discover_units(&prober, &profile, &mut report.skipped).await?;
        report.units_found = unit_numbers.len();

        let mut connected = Vec::new();
        for unit_number in &unit_numbers {
            ensure_live(&prober)?;
            phase.enter(SyncPhase::Discovering);
            let found = discovery::discover_meters(&prober, &profile, unit_number, &mut report.skipped).await?;
            ensure_live(&prober)?;

            let meters = self
                .persist_unit(&profile, unit_number, &found, None, &mut report, phase)
                .await?;
            merge_connected(&mut connected, meters);

            if !report.units_fetched {
                self.store.set_units_fetched(building_id, true).await?;
                report.units_fetched = true;
            }
        }
        report.meters_connected = connected.len();
        log_persisted(&profile, &report);

        if with_readings {
            phase.enter(SyncPhase::Syncing);
            let synced = self.sync_meters(&prober, &profile, connected).await?;
            report.readings_synced = synced.readings_synced;
            report.skipped.extend(synced.skipped);
        }

        Ok(report)
    }

    /// Destructive rebuild of a building's units, meters and readings that
    /// keeps owner assignments by unit number.
    pub async fn reload_units(&self, building_id: Uuid) -> Result<SyncReport, SyncError> {
        let mut phase = PhaseTracker::new("reload_units", building_id);
        let result = self.reload_inner(building_id, &mut phase).await;
        phase.finish(result)
    }

    async fn reload_inner(&self, building_id: Uuid, phase: &mut PhaseTracker) -> Result<SyncReport, SyncError> {
        let _lock = self.locks.acquire(building_id).await;
        let building = self.load_building(building_id).await?;
        let profile = BuildingProfile::resolve(&building, &self.config)?;
        let scope = self.begin();
        let prober = self.prober(&scope);

        let mut report = SyncReport {
            skipped: profile.measurements.skipped(),
            ..SyncReport::default()
        };
        // Discover before purging so a cancelled or failed discovery leaves
        // the building (and its owner assignments) untouched.
        let plan = self.discover(&prober, &profile, &mut report, phase).await?;
        ensure_live(&prober)?;

        let owners = self.store.owner_snapshot(building_id).await?;
        let purged = self.store.purge_building_units(building_id).await?;
        tracing::info!(
            building_id = %building_id,
            units = purged.units,
            meters = purged.meters,
            readings = purged.readings,
            owners = owners.len(),
            "building units purged for reload"
        );

        let mut connected = Vec::new();
        for (unit_number, found) in &plan {
            ensure_live(&prober)?;
            let meters = self
                .persist_unit(&profile, unit_number, found, Some(&owners), &mut report, phase)
                .await?;
            merge_connected(&mut connected, meters);
        }
        report.meters_connected = connected.len();
        log_persisted(&profile, &report);

        report.units_fetched = report.units_found > 0;
        self.store.set_units_fetched(building_id, report.units_fetched).await?;

        if self.config.resync_readings_on_reload {
            phase.enter(SyncPhase::Syncing);
            let synced = self.sync_meters(&prober, &profile, connected).await?;
            report.readings_synced = synced.readings_synced;
            report.skipped.extend(synced.skipped);
        }

        Ok(report)
    }

    /// Removes every unit, meter and reading of a building.
    pub async fn delete_units(&self, building_id: Uuid) -> Result<DeleteReport, SyncError> {
        let _lock = self.locks.acquire(building_id).await;
        self.load_building(building_id).await?;

        let purged = self.store.purge_building_units(building_id).await?;
        tracing::info!(
            building_id = %building_id,
            units = purged.units,
            meters = purged.meters,
            readings = purged.readings,
            "building units deleted"
        );

        Ok(DeleteReport {
            deleted_units: purged.units,
            deleted_meters: purged.meters,
            deleted_readings: purged.readings,
            units_fetched: false,
        })
    }

    pub async fn sync_meter_readings(&self, meter_id: Uuid) -> Result<ReadingsReport, SyncError> {
        let meter = self
            .store
            .get_meter(meter_id)
            .await?
            .ok_or(SyncError::MeterNotFound(meter_id))?;
        let unit = self
            .store
            .get_unit(meter.unit_id)
            .await?
            .ok_or(SyncError::UnitNotFound(meter.unit_id))?;
        self.sync_readings_for(&unit, vec![meter]).await
    }

    pub async fn sync_unit_readings(&self, unit_id: Uuid) -> Result<ReadingsReport, SyncError> {
        let unit = self
            .store
            .get_unit(unit_id)
            .await?
            .ok_or(SyncError::UnitNotFound(unit_id))?;
        let meters = self.store.list_unit_meters(unit_id).await?;
        self.sync_readings_for(&unit, meters).await
    }

    async fn sync_readings_for(&self, unit: &Unit, meters: Vec<Meter>) -> Result<ReadingsReport, SyncError> {
        let mut phase = PhaseTracker::new("sync_readings", unit.building_id);
        let result = self.sync_readings_inner(unit, meters, &mut phase).await;
        phase.finish(result)
    }

    async fn sync_readings_inner(
        &self,
        unit: &Unit,
        meters: Vec<Meter>,
        phase: &mut PhaseTracker,
    ) -> Result<ReadingsReport, SyncError> {
        let _lock = self.locks.acquire(unit.building_id).await;
        let building = self.load_building(unit.building_id).await?;
        let profile = BuildingProfile::resolve(&building, &self.config)?;
        let scope = self.begin();
        let prober = self.prober(&scope);

        phase.enter(SyncPhase::Syncing);
        let synced = self.sync_meters(&prober, &profile, meters).await?;

        let mut report = ReadingsReport {
            skipped: profile.measurements.skipped(),
            ..synced
        };
        report.skipped.extend(synced.skipped);
        Ok(report)
    }

    /// Reads every unit and its meters from telemetry. Nothing is written.
    async fn discover(
        &self,
        prober: &TagProber,
        profile: &BuildingProfile,
        report: &mut SyncReport,
        phase: &mut PhaseTracker,
    ) -> Result<Vec<(String, Vec<DiscoveredMeter>)>, SyncError> {
        phase.enter(SyncPhase::Discovering);
        let unit_numbers = discovery::discover_units(prober, profile, &mut report.skipped).await?;
        report.units_found = unit_numbers.len();

        let mut plan = Vec::with_capacity(unit_numbers.len());
        for unit_number in unit_numbers {
            let meters = discovery::discover_meters(prober, profile, &unit_number, &mut report.skipped).await?;
            plan.push((unit_number, meters));
        }
        Ok(plan)
    }

    /// Creates the unit if it is new, then creates or relocates its meters.
    /// Returns the meters now attached to the unit.
    async fn persist_unit(
        &self,
        profile: &BuildingProfile,
        unit_number: &str,
        discovered: &[DiscoveredMeter],
        owners: Option<&HashMap<String, Uuid>>,
        report: &mut SyncReport,
        phase: &mut PhaseTracker,
    ) -> Result<Vec<Meter>, SyncError> {
        phase.enter(SyncPhase::PersistingUnits);
        let unit = match self.store.find_unit(profile.building_id, unit_number).await? {
            Some(unit) => unit,
            None => {
                let owner = owners.and_then(|o| o.get(unit_number)).copied();
                let new_unit = NewUnit::discovered(profile.building_id, unit_number).with_owner(owner);
                let unit = self.store.insert_unit(&new_unit).await?;
                report.units_created += 1;
                if owner.is_some() {
                    report.owners_restored += 1;
                }
                unit
            }
        };

        phase.enter(SyncPhase::PersistingMeters);
        let mut meters = Vec::with_capacity(discovered.len());
        for found in discovered {
            meters.push(self.upsert_meter(&unit, found).await?);
        }
        Ok(meters)
    }

    /// Creates the meter, or moves an existing one with the same serial to
    /// `unit`. Serial number is the global identity.
    async fn upsert_meter(&self, unit: &Unit, found: &DiscoveredMeter) -> Result<Meter, SyncError> {
        match self.store.find_meter_by_serial(&found.serial_number).await? {
            None => {
                let meter = self
                    .store
                    .insert_meter(&NewMeter {
                        unit_id: unit.id,
                        serial_number: found.serial_number.clone(),
                        kind: found.kind,
                        unit_of_measure: found.unit_of_measure.clone(),
                    })
                    .await?;
                tracing::debug!(serial = %meter.serial_number, unit = %unit.unit_number, "meter created");
                Ok(meter)
            }
            Some(meter) if meter.unit_id == unit.id => Ok(meter),
            Some(mut meter) => {
                self.store.move_meter(meter.id, unit.id).await?;
                metrics::counter!("meters_relocated_total").increment(1);
                tracing::info!(
                    serial = %meter.serial_number,
                    from_unit = %meter.unit_id,
                    to_unit = %unit.id,
                    "meter relocated"
                );
                meter.unit_id = unit.id;
                Ok(meter)
            }
        }
    }

    /// Syncs meters with bounded concurrency; each meter commits on its own,
    /// so meters finished before a failure keep their readings.
    async fn sync_meters(
        &self,
        prober: &TagProber,
        profile: &BuildingProfile,
        meters: Vec<Meter>,
    ) -> Result<ReadingsReport, SyncError> {
        let store = self.store.as_ref();
        let outcomes: Vec<_> = stream::iter(meters)
            .map(|meter| async move { readings::sync_meter(prober, store, profile, &meter).await })
            .buffer_unordered(self.config.meter_concurrency.max(1))
            .collect()
            .await;

        let mut report = ReadingsReport::default();
        let mut failure = None;
        for outcome in outcomes {
            match outcome {
                Ok(o) => {
                    report.meters_synced += 1;
                    report.readings_synced += o.inserted;
                    report.skipped.extend(o.skipped);
                }
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        tracing::info!(
            building_id = %profile.building_id,
            meters = report.meters_synced,
            readings = report.readings_synced,
            "readings synced"
        );
        Ok(report)
    }
}

/// Keyed by serial so a meter seen under several measurements or units counts
/// once, at the unit it was last discovered under.
fn merge_connected(connected: &mut Vec<Meter>, meters: Vec<Meter>) {
    for meter in meters {
        match connected.iter_mut().find(|m| m.serial_number == meter.serial_number) {
            Some(slot) => *slot = meter,
            None => connected.push(meter),
        }
    }
}

fn log_persisted(profile: &BuildingProfile, report: &SyncReport) {
    tracing::info!(
        building_id = %profile.building_id,
        units_found = report.units_found,
        units_created = report.units_created,
        meters_connected = report.meters_connected,
        skipped = report.skipped.len(),
        "discovery persisted"
    );
}

fn ensure_live(prober: &TagProber) -> Result<(), SyncError> {
    if prober.cancel_token().is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    Ok(())
}

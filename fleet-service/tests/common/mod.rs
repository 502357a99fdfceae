//! In-memory doubles for the coordinator's two injected dependencies.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use fleet_service::directory::{DirectoryError, UserDirectory};
use fleet_service::models::{Reservation, ReservationSummary, Vehicle, VehicleChange};
use fleet_service::store::{
    AdmitOutcome, AvailabilityStore, CancelOutcome, RemoveVehicleOutcome, RescheduleOutcome,
    StoreError,
};
use shared::{Interval, ReservationStatus};

/// Ledger plus catalog behind one mutex. Holding the lock across the
/// check-then-insert makes admission atomic, the same guarantee the
/// production store gets from its per-vehicle row lock.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    vehicles: Vec<Vehicle>,
    ledger: Vec<Reservation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_vehicle(&self, vehicle: Vehicle) {
        self.inner.lock().unwrap().vehicles.push(vehicle);
    }

    pub fn ledger_len(&self) -> usize {
        self.inner.lock().unwrap().ledger.len()
    }

    pub fn reservation_sync(&self, id: Uuid) -> Option<Reservation> {
        self.inner
            .lock()
            .unwrap()
            .ledger
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }
}

#[async_trait]
impl AvailabilityStore for MemoryStore {
    async fn vehicle(&self, id: Uuid) -> Result<Option<Vehicle>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .vehicles
            .iter()
            .find(|v| v.id == id)
            .cloned())
    }

    async fn vehicles(&self) -> Result<Vec<Vehicle>, StoreError> {
        Ok(self.inner.lock().unwrap().vehicles.clone())
    }

    async fn available_vehicles(&self) -> Result<Vec<Vehicle>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .vehicles
            .iter()
            .filter(|v| v.availability)
            .cloned()
            .collect())
    }

    async fn add_vehicle(&self, vehicle: Vehicle) -> Result<(), StoreError> {
        self.inner.lock().unwrap().vehicles.push(vehicle);
        Ok(())
    }

    async fn update_vehicle(&self, id: Uuid, change: VehicleChange) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.vehicles.iter_mut().find(|v| v.id == id) {
            Some(v) => {
                v.make = change.make;
                v.model = change.model;
                v.availability = change.availability;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_vehicle(&self, id: Uuid) -> Result<RemoveVehicleOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.ledger.iter().any(|r| r.vehicle_id == id) {
            return Ok(RemoveVehicleOutcome::InUse);
        }
        let before = inner.vehicles.len();
        inner.vehicles.retain(|v| v.id != id);
        if inner.vehicles.len() < before {
            Ok(RemoveVehicleOutcome::Removed)
        } else {
            Ok(RemoveVehicleOutcome::Missing)
        }
    }

    async fn admit(
        &self,
        vehicle_id: Uuid,
        user_id: Uuid,
        window: Interval,
    ) -> Result<AdmitOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let availability = match inner.vehicles.iter().find(|v| v.id == vehicle_id) {
            Some(v) => v.availability,
            None => return Ok(AdmitOutcome::VehicleMissing),
        };
        if !availability {
            return Ok(AdmitOutcome::VehicleWithdrawn);
        }
        let conflict = inner.ledger.iter().any(|r| {
            r.vehicle_id == vehicle_id
                && r.status == ReservationStatus::Active
                && r.interval.overlaps(&window)
        });
        if conflict {
            return Ok(AdmitOutcome::Conflict);
        }
        let id = Uuid::new_v4();
        inner.ledger.push(Reservation {
            id,
            vehicle_id,
            user_id,
            interval: window,
            status: ReservationStatus::Active,
        });
        Ok(AdmitOutcome::Admitted(id))
    }

    async fn has_conflict(&self, vehicle_id: Uuid, window: Interval) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().ledger.iter().any(|r| {
            r.vehicle_id == vehicle_id
                && r.status == ReservationStatus::Active
                && r.interval.overlaps(&window)
        }))
    }

    async fn reschedule(&self, id: Uuid, window: Interval) -> Result<RescheduleOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let (vehicle_id, status) = match inner.ledger.iter().find(|r| r.id == id) {
            Some(r) => (r.vehicle_id, r.status),
            None => return Ok(RescheduleOutcome::Missing),
        };
        if status != ReservationStatus::Active {
            return Ok(RescheduleOutcome::Cancelled);
        }
        let conflict = inner.ledger.iter().any(|r| {
            r.id != id
                && r.vehicle_id == vehicle_id
                && r.status == ReservationStatus::Active
                && r.interval.overlaps(&window)
        });
        if conflict {
            return Ok(RescheduleOutcome::Conflict);
        }
        let entry = inner.ledger.iter_mut().find(|r| r.id == id).unwrap();
        entry.interval = window;
        Ok(RescheduleOutcome::Rescheduled)
    }

    async fn cancel(&self, id: Uuid) -> Result<CancelOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.ledger.iter_mut().find(|r| r.id == id) {
            None => Ok(CancelOutcome::Missing),
            Some(r) if r.status == ReservationStatus::Cancelled => {
                Ok(CancelOutcome::AlreadyCancelled)
            }
            Some(r) => {
                r.status = ReservationStatus::Cancelled;
                Ok(CancelOutcome::Cancelled)
            }
        }
    }

    async fn reservation(&self, id: Uuid) -> Result<Option<Reservation>, StoreError> {
        Ok(self.reservation_sync(id))
    }

    async fn reservations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ReservationSummary>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .ledger
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| {
                let vehicle = inner
                    .vehicles
                    .iter()
                    .find(|v| v.id == r.vehicle_id)
                    .map(Vehicle::display_name)
                    .unwrap_or_else(|| "unknown vehicle".to_string());
                ReservationSummary {
                    id: r.id,
                    vehicle,
                    start_time: r.interval.start(),
                    end_time: r.interval.end(),
                    status: r.status,
                }
            })
            .collect())
    }
}

/// Stub user registry: a fixed set of known ids, an "offline" switch, and a
/// probe counter so tests can assert validation ordering.
#[derive(Default)]
pub struct StubDirectory {
    users: Mutex<HashSet<Uuid>>,
    offline: AtomicBool,
    pub probes: AtomicUsize,
}

impl StubDirectory {
    pub fn with_users(ids: &[Uuid]) -> Self {
        Self {
            users: Mutex::new(ids.iter().copied().collect()),
            ..Self::default()
        }
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserDirectory for StubDirectory {
    async fn exists(&self, user_id: Uuid) -> Result<bool, DirectoryError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable(anyhow::anyhow!(
                "registry offline"
            )));
        }
        Ok(self.users.lock().unwrap().contains(&user_id))
    }
}

pub fn vehicle(available: bool) -> Vehicle {
    Vehicle {
        id: Uuid::new_v4(),
        make: "Toyota".to_string(),
        model: "Corolla".to_string(),
        availability: available,
    }
}

pub fn at(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, hour, min, 0).unwrap()
}

/// A booked fixture: one available vehicle, one known user, and a fresh
/// coordinator wired to both doubles.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub directory: Arc<StubDirectory>,
    pub vehicle: Vehicle,
    pub user_id: Uuid,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let v = vehicle(true);
        store.seed_vehicle(v.clone());
        let user_id = Uuid::new_v4();
        let directory = Arc::new(StubDirectory::with_users(&[user_id]));
        Self {
            store,
            directory,
            vehicle: v,
            user_id,
        }
    }

    pub fn coordinator(&self) -> fleet_service::coordinator::ReservationCoordinator {
        fleet_service::coordinator::ReservationCoordinator::new(
            self.store.clone(),
            self.directory.clone(),
        )
    }
}

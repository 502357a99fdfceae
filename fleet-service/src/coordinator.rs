use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::{Interval, InvalidInterval};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::directory::{DirectoryError, UserDirectory};
use crate::models::{Reservation, ReservationSummary};
use crate::store::{
    AdmitOutcome, AvailabilityStore, CancelOutcome, RescheduleOutcome, StoreError,
};

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    InvalidInterval(#[from] InvalidInterval),
    #[error("user {0} not found")]
    UserNotFound(Uuid),
    #[error("vehicle {0} not found")]
    VehicleNotFound(Uuid),
    #[error("vehicle {0} is withdrawn from service")]
    VehicleUnavailable(Uuid),
    #[error("requested window conflicts with an active reservation")]
    SchedulingConflict,
    #[error("reservation {0} not found")]
    NotFound(Uuid),
    #[error("reservation {0} is cancelled and cannot change")]
    ReservationCancelled(Uuid),
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(#[source] anyhow::Error),
}

impl From<StoreError> for ReservationError {
    fn from(e: StoreError) -> Self {
        ReservationError::DependencyUnavailable(anyhow::anyhow!(e))
    }
}

impl From<DirectoryError> for ReservationError {
    fn from(e: DirectoryError) -> Self {
        ReservationError::DependencyUnavailable(anyhow::anyhow!(e))
    }
}

/// What a cancel call actually did. Both variants are success; retried
/// cancels land on `AlreadyCancelled` instead of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelDisposition {
    Cancelled,
    AlreadyCancelled,
}

/// Orchestrates a booking end to end across the user registry and the
/// availability store, and owns the admission-control policy.
///
/// The coordinator keeps no state of its own; all shared state lives in the
/// stores, so it can be invoked concurrently once per inbound request. Every
/// precondition is verified read-only before the single mutating write on
/// the fleet database, and an unreachable dependency rejects the booking
/// rather than admitting it unverified.
pub struct ReservationCoordinator {
    store: Arc<dyn AvailabilityStore>,
    directory: Arc<dyn UserDirectory>,
}

impl ReservationCoordinator {
    pub fn new(store: Arc<dyn AvailabilityStore>, directory: Arc<dyn UserDirectory>) -> Self {
        Self { store, directory }
    }

    /// Admit a booking or reject it with the first failing precondition:
    /// window validity, then user existence, then the vehicle flag and the
    /// overlap check inside the store's atomic admission unit.
    pub async fn create_reservation(
        &self,
        vehicle_id: Uuid,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Uuid, ReservationError> {
        let window = Interval::new(start, end)?;

        if !self.directory.exists(user_id).await? {
            return Err(ReservationError::UserNotFound(user_id));
        }

        match self.store.admit(vehicle_id, user_id, window).await? {
            AdmitOutcome::Admitted(id) => {
                info!(reservation = %id, vehicle = %vehicle_id, user = %user_id, "reservation admitted");
                Ok(id)
            }
            AdmitOutcome::VehicleMissing => Err(ReservationError::VehicleNotFound(vehicle_id)),
            AdmitOutcome::VehicleWithdrawn => Err(ReservationError::VehicleUnavailable(vehicle_id)),
            AdmitOutcome::Conflict => Err(ReservationError::SchedulingConflict),
        }
    }

    /// Whether the vehicle could take a booking for this window right now.
    /// The static flag is honored only as an administrative withdrawal; the
    /// time-slot truth always comes from the ledger.
    pub async fn check_availability(
        &self,
        vehicle_id: Uuid,
        window: Interval,
    ) -> Result<bool, ReservationError> {
        let vehicle = self
            .store
            .vehicle(vehicle_id)
            .await?
            .ok_or(ReservationError::VehicleNotFound(vehicle_id))?;
        if !vehicle.availability {
            return Ok(false);
        }
        Ok(!self.store.has_conflict(vehicle_id, window).await?)
    }

    pub async fn list_reservations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ReservationSummary>, ReservationError> {
        Ok(self.store.reservations_for_user(user_id).await?)
    }

    /// Full detail for one ledger entry; the read surface billing consumes.
    pub async fn reservation(&self, id: Uuid) -> Result<Reservation, ReservationError> {
        self.store
            .reservation(id)
            .await?
            .ok_or(ReservationError::NotFound(id))
    }

    /// Soft-delete: `active -> cancelled`, terminal. A repeated cancel is
    /// reported as `AlreadyCancelled` rather than failed.
    pub async fn cancel(&self, id: Uuid) -> Result<CancelDisposition, ReservationError> {
        match self.store.cancel(id).await? {
            CancelOutcome::Cancelled => {
                info!(reservation = %id, "reservation cancelled");
                Ok(CancelDisposition::Cancelled)
            }
            CancelOutcome::AlreadyCancelled => Ok(CancelDisposition::AlreadyCancelled),
            CancelOutcome::Missing => Err(ReservationError::NotFound(id)),
        }
    }

    /// Move an active reservation to a new window. The overlap check runs
    /// again against every other active row for the vehicle; on conflict the
    /// original window stays untouched.
    pub async fn reschedule(
        &self,
        id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), ReservationError> {
        let window = Interval::new(start, end)?;

        match self.store.reschedule(id, window).await? {
            RescheduleOutcome::Rescheduled => {
                info!(reservation = %id, "reservation rescheduled");
                Ok(())
            }
            RescheduleOutcome::Missing => Err(ReservationError::NotFound(id)),
            RescheduleOutcome::Cancelled => {
                warn!(reservation = %id, "reschedule attempted on a cancelled reservation");
                Err(ReservationError::ReservationCancelled(id))
            }
            RescheduleOutcome::Conflict => Err(ReservationError::SchedulingConflict),
        }
    }
}

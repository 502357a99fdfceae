use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::{Interval, ReservationStatus};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    NewReservationRow, Reservation, ReservationRow, ReservationSummary, Vehicle, VehicleChange,
};
use crate::schema::{reservations, vehicles};

pub type DbPool = Pool<AsyncPgConnection>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("availability store unreachable: {0}")]
    Unavailable(#[source] anyhow::Error),
    #[error("ledger row is corrupt: {0}")]
    Corrupt(#[source] anyhow::Error),
}

impl StoreError {
    fn query(e: diesel::result::Error) -> Self {
        StoreError::Unavailable(anyhow::anyhow!(e))
    }
}

/// Result of one admission attempt. The variants mirror the precondition
/// that failed; `Admitted` is the only one that wrote a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    Admitted(Uuid),
    VehicleMissing,
    VehicleWithdrawn,
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescheduleOutcome {
    Rescheduled,
    Missing,
    Cancelled,
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    AlreadyCancelled,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveVehicleOutcome {
    Removed,
    Missing,
    /// The vehicle still has ledger rows referencing it.
    InUse,
}

/// Exclusive owner of the vehicle catalog and the reservation ledger.
///
/// `admit` and `reschedule` are the only mutating paths into the ledger's
/// admission state, and each one is a single atomic unit: the overlap check
/// and the write cannot be separated by another writer for the same vehicle.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    async fn vehicle(&self, id: Uuid) -> Result<Option<Vehicle>, StoreError>;
    async fn vehicles(&self) -> Result<Vec<Vehicle>, StoreError>;
    async fn available_vehicles(&self) -> Result<Vec<Vehicle>, StoreError>;
    async fn add_vehicle(&self, vehicle: Vehicle) -> Result<(), StoreError>;
    async fn update_vehicle(&self, id: Uuid, change: VehicleChange) -> Result<bool, StoreError>;
    async fn remove_vehicle(&self, id: Uuid) -> Result<RemoveVehicleOutcome, StoreError>;

    /// Check flag, check overlap, insert: one serializable unit per vehicle.
    async fn admit(
        &self,
        vehicle_id: Uuid,
        user_id: Uuid,
        window: Interval,
    ) -> Result<AdmitOutcome, StoreError>;

    /// Whether any active reservation for the vehicle intersects `window`.
    /// A point-in-time probe only; admission must go through `admit`.
    async fn has_conflict(&self, vehicle_id: Uuid, window: Interval) -> Result<bool, StoreError>;

    /// Rewrite a reservation's window after re-running the overlap check
    /// against every other active row for the same vehicle.
    async fn reschedule(&self, id: Uuid, window: Interval) -> Result<RescheduleOutcome, StoreError>;

    async fn cancel(&self, id: Uuid) -> Result<CancelOutcome, StoreError>;
    async fn reservation(&self, id: Uuid) -> Result<Option<Reservation>, StoreError>;
    async fn reservations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ReservationSummary>, StoreError>;
}

pub struct PgAvailabilityStore {
    pool: DbPool,
}

impl PgAvailabilityStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(
        &self,
    ) -> Result<
        diesel_async::pooled_connection::bb8::PooledConnection<'_, AsyncPgConnection>,
        StoreError,
    > {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(anyhow::anyhow!(e)))
    }
}

/// Active rows for `vehicle_id` whose half-open window intersects `window`,
/// strict on both bounds so adjacent reservations never count.
async fn overlap_count(
    conn: &mut AsyncPgConnection,
    vehicle_id: Uuid,
    window: Interval,
    exclude: Option<Uuid>,
) -> Result<i64, diesel::result::Error> {
    let mut query = reservations::table
        .filter(reservations::vehicle_id.eq(vehicle_id))
        .filter(reservations::status.eq(ReservationStatus::Active.as_str()))
        .filter(reservations::start_time.lt(window.end()))
        .filter(reservations::end_time.gt(window.start()))
        .into_boxed::<diesel::pg::Pg>();
    if let Some(id) = exclude {
        query = query.filter(reservations::id.ne(id));
    }
    query.count().get_result(conn).await
}

#[async_trait]
impl AvailabilityStore for PgAvailabilityStore {
    async fn vehicle(&self, id: Uuid) -> Result<Option<Vehicle>, StoreError> {
        let mut conn = self.conn().await?;
        vehicles::table
            .find(id)
            .first::<Vehicle>(&mut conn)
            .await
            .optional()
            .map_err(StoreError::query)
    }

    async fn vehicles(&self) -> Result<Vec<Vehicle>, StoreError> {
        let mut conn = self.conn().await?;
        vehicles::table
            .load::<Vehicle>(&mut conn)
            .await
            .map_err(StoreError::query)
    }

    async fn available_vehicles(&self) -> Result<Vec<Vehicle>, StoreError> {
        let mut conn = self.conn().await?;
        vehicles::table
            .filter(vehicles::availability.eq(true))
            .load::<Vehicle>(&mut conn)
            .await
            .map_err(StoreError::query)
    }

    async fn add_vehicle(&self, vehicle: Vehicle) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        diesel::insert_into(vehicles::table)
            .values(&vehicle)
            .execute(&mut conn)
            .await
            .map_err(StoreError::query)?;
        Ok(())
    }

    async fn update_vehicle(&self, id: Uuid, change: VehicleChange) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let affected = diesel::update(vehicles::table.find(id))
            .set(&change)
            .execute(&mut conn)
            .await
            .map_err(StoreError::query)?;
        Ok(affected > 0)
    }

    async fn remove_vehicle(&self, id: Uuid) -> Result<RemoveVehicleOutcome, StoreError> {
        let mut conn = self.conn().await?;
        let deleted = diesel::delete(vehicles::table.find(id))
            .execute(&mut conn)
            .await;
        match deleted {
            Ok(0) => Ok(RemoveVehicleOutcome::Missing),
            Ok(_) => Ok(RemoveVehicleOutcome::Removed),
            Err(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::ForeignKeyViolation,
                _,
            )) => Ok(RemoveVehicleOutcome::InUse),
            Err(e) => Err(StoreError::query(e)),
        }
    }

    async fn admit(
        &self,
        vehicle_id: Uuid,
        user_id: Uuid,
        window: Interval,
    ) -> Result<AdmitOutcome, StoreError> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            Box::pin(async move {
                // Row lock on the vehicle serializes admissions per vehicle;
                // bookings against other vehicles are not blocked.
                let vehicle = vehicles::table
                    .find(vehicle_id)
                    .for_update()
                    .first::<Vehicle>(conn)
                    .await
                    .optional()?;

                let vehicle = match vehicle {
                    Some(v) => v,
                    None => return Ok(AdmitOutcome::VehicleMissing),
                };
                if !vehicle.availability {
                    return Ok(AdmitOutcome::VehicleWithdrawn);
                }

                if overlap_count(conn, vehicle_id, window, None).await? > 0 {
                    return Ok(AdmitOutcome::Conflict);
                }

                let row = NewReservationRow {
                    id: Uuid::new_v4(),
                    vehicle_id,
                    user_id,
                    start_time: window.start(),
                    end_time: window.end(),
                    status: ReservationStatus::Active.as_str().to_string(),
                };
                diesel::insert_into(reservations::table)
                    .values(&row)
                    .execute(conn)
                    .await?;

                Ok(AdmitOutcome::Admitted(row.id))
            })
        })
        .await
        .map_err(StoreError::query)
    }

    async fn has_conflict(&self, vehicle_id: Uuid, window: Interval) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let count = overlap_count(&mut conn, vehicle_id, window, None)
            .await
            .map_err(StoreError::query)?;
        Ok(count > 0)
    }

    async fn reschedule(&self, id: Uuid, window: Interval) -> Result<RescheduleOutcome, StoreError> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            Box::pin(async move {
                // Lock the reservation row first: a concurrent cancel takes
                // the same lock, so the status read here always reflects a
                // committed transition and a cancelled row is never rewritten.
                let row = reservations::table
                    .find(id)
                    .for_update()
                    .first::<ReservationRow>(conn)
                    .await
                    .optional()?;

                let row = match row {
                    Some(r) => r,
                    None => return Ok(RescheduleOutcome::Missing),
                };
                if row.status != ReservationStatus::Active.as_str() {
                    return Ok(RescheduleOutcome::Cancelled);
                }

                // Same per-vehicle lock as admission, so a reschedule cannot
                // race a concurrent booking into an overlap.
                let _locked: Uuid = vehicles::table
                    .find(row.vehicle_id)
                    .select(vehicles::id)
                    .for_update()
                    .first(conn)
                    .await?;

                // The row's own current window must not veto its replacement.
                if overlap_count(conn, row.vehicle_id, window, Some(id)).await? > 0 {
                    return Ok(RescheduleOutcome::Conflict);
                }

                diesel::update(reservations::table.find(id))
                    .set((
                        reservations::start_time.eq(window.start()),
                        reservations::end_time.eq(window.end()),
                    ))
                    .execute(conn)
                    .await?;

                Ok(RescheduleOutcome::Rescheduled)
            })
        })
        .await
        .map_err(StoreError::query)
    }

    async fn cancel(&self, id: Uuid) -> Result<CancelOutcome, StoreError> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            Box::pin(async move {
                let status: Option<String> = reservations::table
                    .find(id)
                    .select(reservations::status)
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?;

                match status.as_deref() {
                    None => Ok(CancelOutcome::Missing),
                    Some(s) if s == ReservationStatus::Cancelled.as_str() => {
                        Ok(CancelOutcome::AlreadyCancelled)
                    }
                    Some(_) => {
                        diesel::update(reservations::table.find(id))
                            .set(reservations::status.eq(ReservationStatus::Cancelled.as_str()))
                            .execute(conn)
                            .await?;
                        Ok(CancelOutcome::Cancelled)
                    }
                }
            })
        })
        .await
        .map_err(StoreError::query)
    }

    async fn reservation(&self, id: Uuid) -> Result<Option<Reservation>, StoreError> {
        let mut conn = self.conn().await?;
        let row = reservations::table
            .find(id)
            .first::<ReservationRow>(&mut conn)
            .await
            .optional()
            .map_err(StoreError::query)?;
        row.map(|r| Reservation::try_from(r).map_err(StoreError::Corrupt))
            .transpose()
    }

    async fn reservations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ReservationSummary>, StoreError> {
        let mut conn = self.conn().await?;
        // Ledger insertion order; callers sort by start time themselves if
        // they want a chronological view.
        let rows: Vec<(ReservationRow, Vehicle)> = reservations::table
            .inner_join(vehicles::table)
            .filter(reservations::user_id.eq(user_id))
            .order(reservations::created_at.asc())
            .load(&mut conn)
            .await
            .map_err(StoreError::query)?;

        rows.into_iter()
            .map(|(row, vehicle)| {
                let status = row
                    .status
                    .parse::<ReservationStatus>()
                    .map_err(|e| StoreError::Corrupt(anyhow::anyhow!(e)))?;
                Ok(ReservationSummary {
                    id: row.id,
                    vehicle: vehicle.display_name(),
                    start_time: row.start_time,
                    end_time: row.end_time,
                    status,
                })
            })
            .collect()
    }
}

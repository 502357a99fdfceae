use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use shared::{Interval, ReservationStatus};
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::vehicles)]
pub struct Vehicle {
    pub id: Uuid,
    pub make: String,
    pub model: String,
    pub availability: bool,
}

impl Vehicle {
    /// Display name used in per-user reservation summaries.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.make, self.model)
    }
}

#[derive(Debug, Clone, AsChangeset, Deserialize)]
#[diesel(table_name = crate::schema::vehicles)]
pub struct VehicleChange {
    pub make: String,
    pub model: String,
    pub availability: bool,
}

#[derive(Debug, Clone, Queryable)]
pub struct ReservationRow {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::reservations)]
pub struct NewReservationRow {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
}

/// A ledger entry with its status and window already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub user_id: Uuid,
    pub interval: Interval,
    pub status: ReservationStatus,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = anyhow::Error;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let interval = Interval::new(row.start_time, row.end_time)
            .map_err(|e| anyhow::anyhow!("reservation {} has a corrupt window: {}", row.id, e))?;
        let status = row
            .status
            .parse::<ReservationStatus>()
            .map_err(|e| anyhow::anyhow!("reservation {}: {}", row.id, e))?;
        Ok(Self {
            id: row.id,
            vehicle_id: row.vehicle_id,
            user_id: row.user_id,
            interval,
            status,
        })
    }
}

/// One line of `GET /reservations?user_id=`: ledger fields joined to the
/// vehicle's descriptive name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationSummary {
    pub id: Uuid,
    pub vehicle: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ReservationStatus,
}

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{ErrorBody, Interval, ReservationStatus};
use uuid::Uuid;

use crate::coordinator::{CancelDisposition, ReservationCoordinator, ReservationError};
use crate::directory::UserDirectory;
use crate::models::{Reservation, Vehicle, VehicleChange};
use crate::store::{AvailabilityStore, RemoveVehicleOutcome};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ReservationCoordinator>,
    pub store: Arc<dyn AvailabilityStore>,
    pub directory: Arc<dyn UserDirectory>,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<ReservationError> for ApiError {
    fn from(e: ReservationError) -> Self {
        let status = match &e {
            ReservationError::InvalidInput(_) | ReservationError::InvalidInterval(_) => {
                StatusCode::BAD_REQUEST
            }
            ReservationError::UserNotFound(_)
            | ReservationError::VehicleNotFound(_)
            | ReservationError::NotFound(_) => StatusCode::NOT_FOUND,
            ReservationError::VehicleUnavailable(_)
            | ReservationError::SchedulingConflict
            | ReservationError::ReservationCancelled(_) => StatusCode::CONFLICT,
            ReservationError::DependencyUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {e:#}");
        }
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub vehicle_id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CreateReservationResponse {
    pub reservation_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ReservationDetail {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ReservationStatus,
}

impl From<Reservation> for ReservationDetail {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id,
            vehicle_id: r.vehicle_id,
            user_id: r.user_id,
            start_time: r.interval.start(),
            end_time: r.interval.end(),
            status: r.status,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UserParam {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityParams {
    pub vehicle_id: Uuid,
    pub start_time: String,
    pub end_time: String,
}

fn default_availability() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateVehicleRequest {
    pub make: String,
    pub model: String,
    #[serde(default = "default_availability")]
    pub availability: bool,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/reservations",
            post(create_reservation).get(list_reservations),
        )
        .route(
            "/reservations/:id",
            get(get_reservation)
                .put(update_reservation)
                .delete(cancel_reservation),
        )
        .route("/check-user", get(check_user))
        .route("/check-vehicle-availability", get(check_vehicle_availability))
        .route("/vehicles", get(list_vehicles).post(create_vehicle))
        .route("/vehicles/available", get(list_available_vehicles))
        .route(
            "/vehicles/:id",
            get(get_vehicle).put(update_vehicle).delete(delete_vehicle),
        )
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

async fn create_reservation(
    State(state): State<AppState>,
    payload: Result<Json<CreateReservationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateReservationResponse>), ApiError> {
    let Json(req) = payload.map_err(|e| ReservationError::InvalidInput(e.to_string()))?;
    let reservation_id = state
        .coordinator
        .create_reservation(req.vehicle_id, req.user_id, req.start_time, req.end_time)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateReservationResponse { reservation_id }),
    ))
}

async fn update_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<RescheduleRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ReservationError::InvalidInput(e.to_string()))?;
    state
        .coordinator
        .reschedule(id, req.start_time, req.end_time)
        .await?;
    Ok(Json(MessageResponse {
        message: "Reservation updated successfully".to_string(),
    }))
}

async fn cancel_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = match state.coordinator.cancel(id).await? {
        CancelDisposition::Cancelled => "Reservation cancelled successfully",
        CancelDisposition::AlreadyCancelled => "Reservation was already cancelled",
    };
    Ok(Json(MessageResponse {
        message: message.to_string(),
    }))
}

async fn list_reservations(
    State(state): State<AppState>,
    params: Result<Query<UserParam>, QueryRejection>,
) -> Result<Json<Vec<crate::models::ReservationSummary>>, ApiError> {
    let Query(params) = params.map_err(|_| {
        ReservationError::InvalidInput("user_id query parameter is required".to_string())
    })?;
    let summaries = state.coordinator.list_reservations(params.user_id).await?;
    Ok(Json(summaries))
}

async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationDetail>, ApiError> {
    let reservation = state.coordinator.reservation(id).await?;
    Ok(Json(ReservationDetail::from(reservation)))
}

/// Existence probe over the user registry, for callers that want the answer
/// without attempting a booking.
async fn check_user(
    State(state): State<AppState>,
    params: Result<Query<UserParam>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params.map_err(|_| {
        ReservationError::InvalidInput("user_id query parameter is required".to_string())
    })?;
    let exists = state
        .directory
        .exists(params.user_id)
        .await
        .map_err(ReservationError::from)?;
    if exists {
        Ok((StatusCode::OK, "User exists").into_response())
    } else {
        Ok((StatusCode::NOT_FOUND, "User not found").into_response())
    }
}

async fn check_vehicle_availability(
    State(state): State<AppState>,
    params: Result<Query<AvailabilityParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params.map_err(|e| ReservationError::InvalidInput(e.to_string()))?;
    let start = parse_instant(&params.start_time)?;
    let end = parse_instant(&params.end_time)?;
    let window = Interval::new(start, end).map_err(ReservationError::from)?;

    let available = state
        .coordinator
        .check_availability(params.vehicle_id, window)
        .await?;
    if available {
        Ok((StatusCode::OK, "Vehicle is available").into_response())
    } else {
        Ok((
            StatusCode::CONFLICT,
            "Vehicle is not available for the requested window",
        )
            .into_response())
    }
}

/// Wire timestamps are RFC 3339 strings; comparisons only ever happen on the
/// parsed instants.
fn parse_instant(raw: &str) -> Result<DateTime<Utc>, ReservationError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ReservationError::InvalidInput(format!("bad timestamp {raw:?}: {e}")))
}

async fn list_vehicles(State(state): State<AppState>) -> Result<Json<Vec<Vehicle>>, ApiError> {
    let vehicles = state.store.vehicles().await.map_err(ReservationError::from)?;
    Ok(Json(vehicles))
}

async fn list_available_vehicles(
    State(state): State<AppState>,
) -> Result<Json<Vec<Vehicle>>, ApiError> {
    let vehicles = state
        .store
        .available_vehicles()
        .await
        .map_err(ReservationError::from)?;
    Ok(Json(vehicles))
}

async fn get_vehicle(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vehicle>, ApiError> {
    let vehicle = state
        .store
        .vehicle(id)
        .await
        .map_err(ReservationError::from)?
        .ok_or(ReservationError::VehicleNotFound(id))?;
    Ok(Json(vehicle))
}

async fn create_vehicle(
    State(state): State<AppState>,
    payload: Result<Json<CreateVehicleRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Vehicle>), ApiError> {
    let Json(req) = payload.map_err(|e| ReservationError::InvalidInput(e.to_string()))?;
    let vehicle = Vehicle {
        id: Uuid::new_v4(),
        make: req.make,
        model: req.model,
        availability: req.availability,
    };
    state
        .store
        .add_vehicle(vehicle.clone())
        .await
        .map_err(ReservationError::from)?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}

async fn update_vehicle(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<VehicleChange>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(change) = payload.map_err(|e| ReservationError::InvalidInput(e.to_string()))?;
    let updated = state
        .store
        .update_vehicle(id, change)
        .await
        .map_err(ReservationError::from)?;
    if !updated {
        return Err(ReservationError::VehicleNotFound(id).into());
    }
    Ok(Json(MessageResponse {
        message: "Vehicle updated successfully".to_string(),
    }))
}

async fn delete_vehicle(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    match state
        .store
        .remove_vehicle(id)
        .await
        .map_err(ReservationError::from)?
    {
        RemoveVehicleOutcome::Removed => Ok(Json(MessageResponse {
            message: "Vehicle deleted successfully".to_string(),
        })),
        RemoveVehicleOutcome::Missing => Err(ReservationError::VehicleNotFound(id).into()),
        RemoveVehicleOutcome::InUse => Err(ApiError {
            status: StatusCode::CONFLICT,
            message: "vehicle has reservations on the ledger and cannot be deleted".to_string(),
        }),
    }
}

async fn health_check() -> &'static str {
    "OK"
}

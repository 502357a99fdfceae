use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use shared::ErrorBody;
use uuid::Uuid;

use crate::models::{User, UserChange, MEMBERSHIP_TIERS};
use crate::schema::users;

type DbPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }

    fn not_found(id: Uuid) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("user {id} not found"),
        }
    }

    fn database(e: impl std::fmt::Display) -> Self {
        tracing::error!("database error: {e}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "user registry unavailable".to_string(),
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
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub membership_tier: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn validate_tier(tier: &str) -> Result<(), ApiError> {
    if MEMBERSHIP_TIERS.contains(&tier) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!(
            "invalid membership tier {tier:?}"
        )))
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
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

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    let mut conn = state.pool.get().await.map_err(ApiError::database)?;
    let all = users::table
        .load::<User>(&mut conn)
        .await
        .map_err(ApiError::database)?;
    Ok(Json(all))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    let mut conn = state.pool.get().await.map_err(ApiError::database)?;
    let user = users::table
        .find(id)
        .first::<User>(&mut conn)
        .await
        .optional()
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found(id))?;
    Ok(Json(user))
}

async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::bad_request(format!("invalid input: {e}")))?;
    validate_tier(&req.membership_tier)?;

    let user = User {
        id: Uuid::new_v4(),
        name: req.name,
        email: req.email,
        membership_tier: req.membership_tier,
    };

    let mut conn = state.pool.get().await.map_err(ApiError::database)?;
    diesel::insert_into(users::table)
        .values(&user)
        .execute(&mut conn)
        .await
        .map_err(ApiError::database)?;

    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<UserChange>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(change) = payload.map_err(|e| ApiError::bad_request(format!("invalid input: {e}")))?;
    validate_tier(&change.membership_tier)?;

    let mut conn = state.pool.get().await.map_err(ApiError::database)?;
    let affected = diesel::update(users::table.find(id))
        .set(&change)
        .execute(&mut conn)
        .await
        .map_err(ApiError::database)?;
    if affected == 0 {
        return Err(ApiError::not_found(id));
    }
    Ok(Json(MessageResponse {
        message: "User updated successfully".to_string(),
    }))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let mut conn = state.pool.get().await.map_err(ApiError::database)?;
    let affected = diesel::delete(users::table.find(id))
        .execute(&mut conn)
        .await
        .map_err(ApiError::database)?;
    if affected == 0 {
        return Err(ApiError::not_found(id));
    }
    Ok(Json(MessageResponse {
        message: "User deleted successfully".to_string(),
    }))
}

async fn health_check() -> &'static str {
    "OK"
}

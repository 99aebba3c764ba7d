use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::{Trip, TripSearch};
use crate::services::{CreateTrip, TripStats, UpdateTrip};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/trips", post(create_trip).get(search_trips))
        .route("/api/trips/mine", get(my_trips))
        .route("/api/trips/{id}", get(get_trip).put(update_trip))
        .route("/api/trips/{id}/cancel", post(cancel_trip))
        .route("/api/trips/{id}/stats", get(trip_stats))
}

async fn create_trip(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<CreateTrip>,
) -> AppResult<(StatusCode, Json<Trip>)> {
    let trip = state.trips.create(user.user_id, body).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

async fn search_trips(
    State(state): State<Arc<AppState>>,
    Query(search): Query<TripSearch>,
) -> AppResult<Json<Vec<Trip>>> {
    Ok(Json(state.trips.search(search).await?))
}

async fn my_trips(State(state): State<Arc<AppState>>, user: AuthUser) -> AppResult<Json<Vec<Trip>>> {
    Ok(Json(state.trips.list_mine(user.user_id).await?))
}

/// Public; signed-in viewers are counted as unique viewers
async fn get_trip(
    State(state): State<Arc<AppState>>,
    viewer: Result<AuthUser, AppError>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Trip>> {
    let viewer = viewer.ok().map(|u| u.user_id);
    Ok(Json(state.trips.get(id, viewer).await?))
}

async fn update_trip(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateTrip>,
) -> AppResult<Json<Trip>> {
    Ok(Json(state.trips.update(user.user_id, id, body).await?))
}

async fn cancel_trip(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Trip>> {
    Ok(Json(state.trips.cancel(user.user_id, id).await?))
}

async fn trip_stats(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TripStats>> {
    Ok(Json(state.trips.stats(user.user_id, id).await?))
}

//! Match lifecycle: request, accept, pay, pickup, transit, delivery.

use crate::auth::AuthUser;
use crate::error::AppResult;
use crate::models::{EscrowRecord, Match, MatchStatus};
use crate::services::{CancelMatch, PayMatch, RequestMatch};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/matches", post(request_match).get(list_matches))
        .route("/api/matches/{id}", get(get_match))
        .route("/api/matches/{id}/escrow", get(get_escrow))
        .route("/api/matches/{id}/accept", post(accept))
        .route("/api/matches/{id}/pay", post(pay))
        .route("/api/matches/{id}/confirm-pickup", post(confirm_pickup))
        .route("/api/matches/{id}/start-transit", post(start_transit))
        .route("/api/matches/{id}/deliver", post(deliver))
        .route("/api/matches/{id}/confirm-delivery", post(confirm_delivery))
        .route("/api/matches/{id}/cancel", post(cancel))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<MatchStatus>,
}

async fn request_match(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<RequestMatch>,
) -> AppResult<(StatusCode, Json<Match>)> {
    let m = state.matches.request(user.user_id, body).await?;
    Ok((StatusCode::CREATED, Json(m)))
}

async fn list_matches(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Match>>> {
    Ok(Json(state.matches.list(user.user_id, query.status).await?))
}

async fn get_match(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Match>> {
    Ok(Json(state.matches.get(user.user_id, id).await?))
}

async fn get_escrow(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<EscrowRecord>> {
    Ok(Json(state.matches.escrow(user.user_id, id).await?))
}

async fn accept(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Match>> {
    Ok(Json(state.matches.accept(user.user_id, id).await?))
}

async fn pay(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<PayMatch>,
) -> AppResult<Json<Match>> {
    Ok(Json(state.matches.pay(user.user_id, id, body).await?))
}

async fn confirm_pickup(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Match>> {
    Ok(Json(state.matches.confirm_pickup(user.user_id, id).await?))
}

async fn start_transit(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Match>> {
    Ok(Json(state.matches.start_transit(user.user_id, id).await?))
}

async fn deliver(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Match>> {
    Ok(Json(state.matches.deliver(user.user_id, id).await?))
}

/// Sender confirms receipt; releases escrow to the traveler
async fn confirm_delivery(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<EscrowRecord>> {
    Ok(Json(state.matches.confirm_delivery(user.user_id, id).await?))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<CancelMatch>,
) -> AppResult<Json<Match>> {
    Ok(Json(state.matches.cancel(user.user_id, id, body).await?))
}

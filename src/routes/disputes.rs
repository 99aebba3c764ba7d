use crate::auth::{AdminUser, AuthUser};
use crate::error::AppResult;
use crate::models::Dispute;
use crate::services::{OpenDispute, ResolveDispute};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/matches/{id}/disputes", post(open_dispute))
        .route("/api/disputes", get(list_disputes))
        .route("/api/disputes/{id}", get(get_dispute))
        .route("/api/disputes/{id}/withdraw", post(withdraw))
        .route("/api/admin/disputes/{id}/review", post(start_review))
        .route("/api/admin/disputes/{id}/resolve", post(resolve))
}

async fn open_dispute(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(match_id): Path<Uuid>,
    Json(body): Json<OpenDispute>,
) -> AppResult<(StatusCode, Json<Dispute>)> {
    let dispute = state.disputes.open(user.user_id, match_id, body).await?;
    Ok((StatusCode::CREATED, Json(dispute)))
}

async fn list_disputes(State(state): State<Arc<AppState>>, user: AuthUser) -> AppResult<Json<Vec<Dispute>>> {
    Ok(Json(state.disputes.list(user.user_id).await?))
}

async fn get_dispute(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Dispute>> {
    Ok(Json(state.disputes.get(user.user_id, id).await?))
}

async fn withdraw(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Dispute>> {
    Ok(Json(state.disputes.withdraw(user.user_id, id).await?))
}

async fn start_review(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Dispute>> {
    Ok(Json(state.disputes.start_review(admin.user_id, id).await?))
}

async fn resolve(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ResolveDispute>,
) -> AppResult<Json<Dispute>> {
    Ok(Json(state.disputes.resolve(admin.user_id, id, body).await?))
}

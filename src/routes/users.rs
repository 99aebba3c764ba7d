//! Accounts, KYC and the personal dashboard.

use crate::auth::{AdminUser, AuthUser};
use crate::error::AppResult;
use crate::models::User;
use crate::services::{Dashboard, RegisterUser, UpdateProfile};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users", post(register))
        .route("/api/me", get(get_me).put(update_me))
        .route("/api/me/kyc", post(submit_kyc))
        .route("/api/admin/users/{id}/kyc", post(review_kyc))
        .route("/api/dashboard", get(dashboard))
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state.users.register(body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_me(State(state): State<Arc<AppState>>, user: AuthUser) -> AppResult<Json<User>> {
    Ok(Json(state.users.get(user.user_id).await?))
}

async fn update_me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<UpdateProfile>,
) -> AppResult<Json<User>> {
    Ok(Json(state.users.update_profile(user.user_id, body).await?))
}

async fn submit_kyc(State(state): State<Arc<AppState>>, user: AuthUser) -> AppResult<Json<User>> {
    Ok(Json(state.users.submit_kyc(user.user_id).await?))
}

#[derive(Debug, Deserialize)]
struct KycDecision {
    approve: bool,
}

async fn review_kyc(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<KycDecision>,
) -> AppResult<Json<User>> {
    Ok(Json(state.users.review_kyc(id, body.approve).await?))
}

async fn dashboard(State(state): State<Arc<AppState>>, user: AuthUser) -> AppResult<Json<Dashboard>> {
    Ok(Json(state.dashboard.get(user.user_id).await?))
}

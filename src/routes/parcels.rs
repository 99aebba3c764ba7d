use crate::auth::AuthUser;
use crate::error::AppResult;
use crate::models::{Parcel, ParcelSearch};
use crate::services::CreateParcel;
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
        .route("/api/parcels", post(create_parcel).get(search_parcels))
        .route("/api/parcels/mine", get(my_parcels))
        .route("/api/parcels/{id}", get(get_parcel))
        .route("/api/parcels/{id}/cancel", post(cancel_parcel))
}

async fn create_parcel(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<CreateParcel>,
) -> AppResult<(StatusCode, Json<Parcel>)> {
    let parcel = state.parcels.create(user.user_id, body).await?;
    Ok((StatusCode::CREATED, Json(parcel)))
}

async fn search_parcels(
    State(state): State<Arc<AppState>>,
    Query(search): Query<ParcelSearch>,
) -> AppResult<Json<Vec<Parcel>>> {
    Ok(Json(state.parcels.search(search).await?))
}

async fn my_parcels(State(state): State<Arc<AppState>>, user: AuthUser) -> AppResult<Json<Vec<Parcel>>> {
    Ok(Json(state.parcels.list_mine(user.user_id).await?))
}

async fn get_parcel(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> AppResult<Json<Parcel>> {
    Ok(Json(state.parcels.get(id).await?))
}

async fn cancel_parcel(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Parcel>> {
    Ok(Json(state.parcels.cancel(user.user_id, id).await?))
}

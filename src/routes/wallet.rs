//! Wallet balance, ledger, payout methods and withdrawals.

use crate::auth::{AdminUser, AuthUser};
use crate::error::AppResult;
use crate::models::{PayoutMethod, Wallet, WalletTransaction, Withdrawal};
use crate::services::{AddPayoutMethod, RequestWithdrawal};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/wallet", get(get_wallet))
        .route("/api/wallet/transactions", get(list_transactions))
        .route(
            "/api/wallet/payout-methods",
            get(list_payout_methods).post(add_payout_method),
        )
        .route("/api/wallet/payout-methods/{id}", delete(remove_payout_method))
        .route(
            "/api/wallet/withdrawals",
            get(list_withdrawals).post(request_withdrawal),
        )
        .route("/api/wallet/withdrawals/{id}/cancel", post(cancel_withdrawal))
        .route("/api/admin/withdrawals/{id}/process", post(start_processing))
        .route("/api/admin/withdrawals/{id}/complete", post(complete_withdrawal))
        .route("/api/admin/withdrawals/{id}/fail", post(fail_withdrawal))
}

#[derive(Debug, Deserialize)]
struct Page {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct FailWithdrawal {
    #[serde(default)]
    reason: String,
}

async fn get_wallet(State(state): State<Arc<AppState>>, user: AuthUser) -> AppResult<Json<Wallet>> {
    Ok(Json(state.wallets.get_wallet(user.user_id).await?))
}

async fn list_transactions(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(page): Query<Page>,
) -> AppResult<Json<Vec<WalletTransaction>>> {
    let txs = state
        .wallets
        .list_transactions(user.user_id, page.limit, page.offset)
        .await?;
    Ok(Json(txs))
}

async fn list_payout_methods(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<Vec<PayoutMethod>>> {
    Ok(Json(state.wallets.list_payout_methods(user.user_id).await?))
}

async fn add_payout_method(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<AddPayoutMethod>,
) -> AppResult<(StatusCode, Json<PayoutMethod>)> {
    let method = state.wallets.add_payout_method(user.user_id, body).await?;
    Ok((StatusCode::CREATED, Json(method)))
}

async fn remove_payout_method(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.wallets.remove_payout_method(user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_withdrawals(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<Vec<Withdrawal>>> {
    Ok(Json(state.wallets.list_withdrawals(user.user_id).await?))
}

async fn request_withdrawal(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<RequestWithdrawal>,
) -> AppResult<(StatusCode, Json<Withdrawal>)> {
    let withdrawal = state.wallets.request_withdrawal(user.user_id, body).await?;
    Ok((StatusCode::CREATED, Json(withdrawal)))
}

async fn cancel_withdrawal(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Withdrawal>> {
    Ok(Json(state.wallets.cancel_withdrawal(user.user_id, id).await?))
}

async fn start_processing(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Withdrawal>> {
    Ok(Json(state.wallets.start_processing(id).await?))
}

async fn complete_withdrawal(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Withdrawal>> {
    Ok(Json(state.wallets.complete_withdrawal(id).await?))
}

async fn fail_withdrawal(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<FailWithdrawal>,
) -> AppResult<Json<Withdrawal>> {
    Ok(Json(state.wallets.fail_withdrawal(id, &body.reason).await?))
}

use crate::cache::{CacheKeys, CacheTtl};
use crate::error::{AppError, AppResult};
use crate::pricing::{PriceEstimate, PriceQuery};
use crate::AppState;
use axum::{extract::State, routing::post, Json, Router};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/pricing/estimate", post(estimate))
}

/// Public quote; identical queries are served from the cache for a day
async fn estimate(
    State(state): State<Arc<AppState>>,
    Json(query): Json<PriceQuery>,
) -> AppResult<Json<PriceEstimate>> {
    let estimator = state.estimator.clone();
    let key = CacheKeys::price_estimate(&query);
    let estimate = state
        .cache
        .get_or_set(&key, CacheTtl::Daily, || async move {
            estimator.estimate(&query).map_err(AppError::from)
        })
        .await?;
    Ok(Json(estimate))
}

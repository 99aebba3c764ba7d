//! HTTP route handlers.

pub mod disputes;
pub mod matches;
pub mod parcels;
pub mod pricing;
pub mod trips;
pub mod users;
pub mod wallet;

use crate::auth::{ADMIN_KEY_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER, USER_ID_HEADER};
use crate::AppState;
use axum::extract::State;
use axum::http::{header, HeaderName, Method, Uri};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub cache: &'static str,
    pub cache_connected: bool,
}

/// Health check response. Degraded when the database is unreachable;
/// a missing cache only shows up in the detail fields.
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = state.database.ping().await;
    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        database,
        cache: state.cache.backend_name(),
        cache_connected: state.cache.is_connected(),
    })
}

/// The configured frontend, or a local dev server on any port
fn is_allowed_origin(origin: &str, frontend_url: &str) -> bool {
    if origin == frontend_url.trim_end_matches('/') {
        return true;
    }
    let Ok(uri) = origin.parse::<Uri>() else {
        return false;
    };
    let local_host = matches!(uri.host(), Some("localhost") | Some("127.0.0.1"));
    let bare = uri.path_and_query().map_or(true, |pq| pq.as_str() == "/");
    uri.scheme_str() == Some("http") && local_host && bare
}

fn cors_layer(frontend_url: String) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &axum::http::HeaderValue, _parts: &axum::http::request::Parts| {
                origin
                    .to_str()
                    .map(|origin| is_allowed_origin(origin, &frontend_url))
                    .unwrap_or(false)
            },
        ))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(TIMESTAMP_HEADER),
            HeaderName::from_static(SIGNATURE_HEADER),
            HeaderName::from_static(ADMIN_KEY_HEADER),
        ])
}

/// Build the complete router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(state.config.frontend_url.clone());

    Router::new()
        .route("/health", get(health_check))
        .merge(users::routes())
        .merge(pricing::routes())
        .merge(trips::routes())
        .merge(parcels::routes())
        .merge(matches::routes())
        .merge(disputes::routes())
        .merge(wallet::routes())
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_allow_list() {
        let frontend = "https://app.airbar.example";
        assert!(is_allowed_origin("https://app.airbar.example", frontend));
        assert!(is_allowed_origin("http://localhost:5173", frontend));
        assert!(is_allowed_origin("http://localhost", frontend));
        assert!(is_allowed_origin("http://127.0.0.1:3000", frontend));

        assert!(!is_allowed_origin("http://localhost.evil.example", frontend));
        assert!(!is_allowed_origin("http://127.0.0.1.evil.example:80", frontend));
        assert!(!is_allowed_origin("http://evil.example/localhost", frontend));
        assert!(!is_allowed_origin("https://app.airbar.example.evil", frontend));
        assert!(!is_allowed_origin("null", frontend));
    }
}

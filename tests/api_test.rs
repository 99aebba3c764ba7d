mod helpers;

use airbar_backend::auth::{
    sign, ADMIN_KEY_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER, USER_ID_HEADER,
};
use airbar_backend::routes::create_router;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use helpers::*;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn app() -> Router {
    create_router(offline_state())
}

fn signed(builder: axum::http::request::Builder, user_id: Uuid, timestamp: i64) -> axum::http::request::Builder {
    builder
        .header(USER_ID_HEADER, user_id.to_string())
        .header(TIMESTAMP_HEADER, timestamp.to_string())
        .header(SIGNATURE_HEADER, sign("airbar-dev-secret", user_id, timestamp))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn money(value: &Value) -> Decimal {
    value.as_str().expect("money is a string").parse().unwrap()
}

#[tokio::test]
async fn test_health_reports_unreachable_database() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(app(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], false);
    assert_eq!(body["cache"], "memory");
    assert_eq!(body["cache_connected"], true);
}

#[tokio::test]
async fn test_missing_auth_headers_rejected() {
    let request = Request::builder().uri("/api/me").body(Body::empty()).unwrap();
    let (status, body) = send(app(), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_stale_signature_rejected() {
    let stale = chrono::Utc::now().timestamp() - 3600;
    let request = signed(Request::builder().uri("/api/wallet"), Uuid::new_v4(), stale)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["details"].as_str().unwrap().contains("expired"));
}

#[tokio::test]
async fn test_admin_routes_need_admin_key() {
    let now = chrono::Utc::now().timestamp();
    let uri = format!("/api/admin/users/{}/kyc", Uuid::new_v4());

    let request = signed(Request::builder().method(Method::POST).uri(&uri), Uuid::new_v4(), now)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "approve": true }).to_string()))
        .unwrap();
    let (status, body) = send(app(), request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let request = signed(Request::builder().method(Method::POST).uri(&uri), Uuid::new_v4(), now)
        .header(ADMIN_KEY_HEADER, "wrong-key")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "approve": true }).to_string()))
        .unwrap();
    let (status, _) = send(app(), request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_price_estimate() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/pricing/estimate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "weight_kg": "2",
                "origin_country": "NG",
                "destination_country": "GB"
            })
            .to_string(),
        ))
        .unwrap();
    let (status, body) = send(app(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cross_border"], true);
    assert_eq!(money(&body["subtotal"]), Decimal::new(3100, 2));
    assert_eq!(money(&body["platform_fee"]), Decimal::new(310, 2));
    assert_eq!(money(&body["total"]), Decimal::new(3410, 2));
}

#[tokio::test]
async fn test_price_estimate_rejects_overweight() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/pricing/estimate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "weight_kg": "51",
                "origin_country": "NG",
                "destination_country": "GB"
            })
            .to_string(),
        ))
        .unwrap();
    let (status, body) = send(app(), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_malformed_body_rejected_before_handler() {
    let now = chrono::Utc::now().timestamp();
    let request = signed(
        Request::builder().method(Method::POST).uri("/api/parcels"),
        Uuid::new_v4(),
        now,
    )
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from(json!({ "title": "No weight" }).to_string()))
    .unwrap();
    let (status, _) = send(app(), request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_invalid_path_id_rejected() {
    let now = chrono::Utc::now().timestamp();
    let request = signed(Request::builder().uri("/api/matches/not-a-uuid"), Uuid::new_v4(), now)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app(), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cors_preflight_allows_frontend() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/trips")
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-auth-signature")
        .body(Body::empty())
        .unwrap();
    let response = app().oneshot(request).await.unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:5173"
    );
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let request = Request::builder().uri("/api/nothing-here").body(Body::empty()).unwrap();
    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_rejects_lookalike_localhost() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/trips")
        .header(header::ORIGIN, "http://localhost.evil.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app().oneshot(request).await.unwrap();

    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn test_price_estimate_rejects_huge_rate() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/pricing/estimate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "weight_kg": "50",
                "origin_country": "NG",
                "destination_country": "GB",
                "rate_per_kg": Decimal::MAX.to_string()
            })
            .to_string(),
        ))
        .unwrap();
    let (status, body) = send(app(), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

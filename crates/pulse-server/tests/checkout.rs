//! Tests for checkout, post-payment and health endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{StatusCode, header};
use tower::ServiceExt;

use pulse_licensing::{CheckoutGateway, KeyGenerator, LicenseRecord, LicenseStore, LicenseType, Plan};
use pulse_server::router;

mod common;
use common::*;

#[tokio::test]
async fn test_create_checkout_returns_url_and_session() {
    let (_dir, state) = create_test_app_state(&[]);
    let (gateway, state) = with_fake_gateway(state);

    let response = router(state)
        .oneshot(post_json(
            "/api/create-checkout",
            &serde_json::json!({ "plan": "monthly", "email": "buyer@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({
            "url": "https://checkout.stripe.com/c/pay/cs_test_monthly",
            "sessionId": "cs_test_monthly"
        })
    );

    let requests = gateway.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].plan, Plan::Monthly);
    assert_eq!(requests[0].customer_email.as_deref(), Some("buyer@example.com"));
}

#[tokio::test]
async fn test_unknown_plan_is_bad_request() {
    let (_dir, state) = create_test_app_state(&[]);
    let (gateway, state) = with_fake_gateway(state);

    let response = router(state)
        .oneshot(post_json("/api/create-checkout", &serde_json::json!({ "plan": "weekly" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "UNKNOWN_PLAN");
    assert!(gateway.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_checkout_body_is_json_error() {
    let (_dir, state) = create_test_app_state(&[]);
    let (gateway, state) = with_fake_gateway(state);

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/create-checkout")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{\"plan\": "))
        .unwrap();
    let response = router(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    let body = body_json(response).await;
    assert_eq!(body["code"], "BAD_REQUEST");
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
    assert!(gateway.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_checkout_without_stripe_is_unavailable() {
    let (_dir, state) = create_test_app_state(&[]);

    let response = router(state)
        .oneshot(post_json("/api/create-checkout", &serde_json::json!({ "plan": "lifetime" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "PAYMENTS_DISABLED");
}

#[tokio::test]
async fn test_processor_failure_is_bad_gateway() {
    let (_dir, state) = create_test_app_state(&[]);
    let state = state.with_checkout(Arc::new(FakeGateway::failing()) as Arc<dyn CheckoutGateway>);

    let response = router(state)
        .oneshot(post_json("/api/create-checkout", &serde_json::json!({ "plan": "lifetime" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "CHECKOUT_ERROR");
    assert!(!body["error"].as_str().unwrap().contains("card_declined"));
}

#[tokio::test]
async fn test_checkout_link_redirects() {
    let (_dir, state) = create_test_app_state(&[]);
    let (_gateway, state) = with_fake_gateway(state);
    let app = router(state);

    let response = app.clone().oneshot(get("/checkout/lifetime")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "https://checkout.stripe.com/c/pay/cs_test_lifetime"
    );

    let response = app.oneshot(get("/checkout/forever")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_success_waits_for_webhook() {
    let (_dir, state) = create_test_app_state(&[("SUCCESS_WAIT_MS", "2000")]);
    let store = Arc::clone(&state.store);

    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        store
            .append(LicenseRecord::issue(
                KeyGenerator::default().generate(),
                "late@example.com",
                LicenseType::Lifetime,
                "cs_late",
            ))
            .unwrap();
    });

    let response = router(state)
        .oneshot(get("/success?session_id=cs_late"))
        .await
        .unwrap();
    writer.await.unwrap();

    let body = body_json(response).await;
    assert_eq!(body["sessionId"], "cs_late");
    assert_eq!(body["status"], "ready");
    assert!(body["licenseKey"].as_str().unwrap().starts_with("PULSE-"));
}

#[tokio::test]
async fn test_success_reports_pending_after_wait() {
    let (_dir, state) = create_test_app_state(&[("SUCCESS_WAIT_MS", "0")]);
    let app = router(state);

    let response = app.clone().oneshot(get("/success?session_id=cs_never")).await.unwrap();
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "sessionId": "cs_never", "status": "pending" })
    );

    let response = app.oneshot(get("/api/checkout/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_and_cancel() {
    let (_dir, state) = create_test_app_state(&[]);
    let app = router(state);

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let response = app.oneshot(get("/cancel")).await.unwrap();
    assert_eq!(body_json(response).await, serde_json::json!({ "cancelled": true }));
}

//! Buyer-facing endpoint tests: coupon verification over HTTP, checkout
//! session creation against a stubbed payment provider, and the
//! post-payment callback redirect.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use tower::ServiceExt;

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ============ Health Tests ============

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app(create_test_app_state());

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

// ============ Verify Endpoint Tests ============

#[tokio::test]
async fn test_verify_endpoint_approves_valid_code() {
    let state = create_test_app_state();
    let product_id = {
        let conn = state.db.get().unwrap();
        let product = create_test_product(&conn, "Course", 10000);
        create_test_coupon(&conn, &coupon_input("SAVE10"));
        product.id
    };

    let app = test_app(state);
    let response = app
        .oneshot(post_json(
            "/api/coupons/verify",
            serde_json::json!({
                "code": "save10",
                "product_id": product_id,
                "email": "alice@example.com",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["already_reserved"], false);
    assert!(body["reservation_id"].is_string());
    assert_eq!(body["discount_type"], "percentage");
    assert_eq!(body["discount_value"], 10);
    assert_eq!(body["exclude_order_bumps"], false);
    assert!(body.get("error").is_none(), "no error field on approval");
}

#[tokio::test]
async fn test_verify_endpoint_rejection_is_http_200() {
    let state = create_test_app_state();
    let product_id = {
        let conn = state.db.get().unwrap();
        create_test_product(&conn, "Course", 10000).id
    };

    let app = test_app(state);
    let response = app
        .oneshot(post_json(
            "/api/coupons/verify",
            serde_json::json!({
                "code": "NOSUCH",
                "product_id": product_id,
                "email": "alice@example.com",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK, "rejections are data, not errors");
    let body = body_json(response).await;
    assert_eq!(body["valid"], false);
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["message"], "This coupon code does not exist");
    assert!(body.get("reservation_id").is_none());
    assert!(body.get("discount_value").is_none());
}

#[tokio::test]
async fn test_verify_endpoint_without_email_defers_hold() {
    let state = create_test_app_state();
    let product_id = {
        let conn = state.db.get().unwrap();
        let product = create_test_product(&conn, "Course", 10000);
        create_test_coupon(&conn, &coupon_input("SAVE10"));
        product.id
    };

    let app = test_app(state.clone());
    let response = app
        .oneshot(post_json(
            "/api/coupons/verify",
            serde_json::json!({ "code": "SAVE10", "product_id": product_id }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["valid"], true);
    assert!(
        body.get("reservation_id").is_none(),
        "no hold without an email"
    );
}

#[tokio::test]
async fn test_verify_endpoint_rejects_malformed_body() {
    let app = test_app(create_test_app_state());

    let response = app
        .oneshot(post_json(
            "/api/coupons/verify",
            serde_json::json!({ "code": "SAVE10" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============ Checkout Validation Tests ============

#[tokio::test]
async fn test_checkout_without_provider_is_rejected() {
    let state = create_test_app_state();
    let product_id = {
        let conn = state.db.get().unwrap();
        create_test_product(&conn, "Course", 10000).id
    };

    let app = test_app(state);
    let response = app
        .oneshot(post_json(
            "/api/checkout",
            serde_json::json!({ "product_id": product_id, "email": "a@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Bad request");
    assert_eq!(body["details"], "No payment provider configured");
}

#[tokio::test]
async fn test_checkout_unknown_product_is_not_found() {
    // Validation fails before any provider call, so no stub is needed
    let state = create_test_app_state_with_provider("http://127.0.0.1:9");

    let app = test_app(state);
    let response = app
        .oneshot(post_json(
            "/api/checkout",
            serde_json::json!({ "product_id": "nope", "email": "a@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_blank_email_is_rejected() {
    let state = create_test_app_state_with_provider("http://127.0.0.1:9");
    let product_id = {
        let conn = state.db.get().unwrap();
        create_test_product(&conn, "Course", 10000).id
    };

    let app = test_app(state);
    let response = app
        .oneshot(post_json(
            "/api/checkout",
            serde_json::json!({ "product_id": product_id, "email": "   " }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_inactive_product_is_rejected() {
    let state = create_test_app_state_with_provider("http://127.0.0.1:9");
    let product_id = {
        let conn = state.db.get().unwrap();
        let product = create_test_product(&conn, "Course", 10000);
        conn.execute(
            "UPDATE products SET active = 0 WHERE id = ?1",
            rusqlite::params![product.id],
        )
        .unwrap();
        product.id
    };

    let app = test_app(state);
    let response = app
        .oneshot(post_json(
            "/api/checkout",
            serde_json::json!({ "product_id": product_id, "email": "a@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_unknown_bump_is_rejected() {
    let state = create_test_app_state_with_provider("http://127.0.0.1:9");
    let product_id = {
        let conn = state.db.get().unwrap();
        create_test_product(&conn, "Course", 10000).id
    };

    let app = test_app(state);
    let response = app
        .oneshot(post_json(
            "/api/checkout",
            serde_json::json!({
                "product_id": product_id,
                "email": "a@example.com",
                "order_bump_ids": ["missing"],
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_plain_product_cannot_be_a_bump() {
    let state = create_test_app_state_with_provider("http://127.0.0.1:9");
    let (product_id, other_id) = {
        let conn = state.db.get().unwrap();
        let product = create_test_product(&conn, "Course", 10000);
        let other = create_test_product(&conn, "Another Course", 5000);
        (product.id, other.id)
    };

    let app = test_app(state);
    let response = app
        .oneshot(post_json(
            "/api/checkout",
            serde_json::json!({
                "product_id": product_id,
                "email": "a@example.com",
                "order_bump_ids": [other_id],
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_bump_currency_must_match() {
    let state = create_test_app_state_with_provider("http://127.0.0.1:9");
    let (product_id, bump_id) = {
        let conn = state.db.get().unwrap();
        let product = create_test_product(&conn, "Course", 10000);
        let bump = queries::create_product(
            &conn,
            &CreateProduct {
                name: "EU Workbook".to_string(),
                price_cents: 1900,
                currency: Some("eur".to_string()),
                is_order_bump: true,
            },
        )
        .unwrap();
        (product.id, bump.id)
    };

    let app = test_app(state);
    let response = app
        .oneshot(post_json(
            "/api/checkout",
            serde_json::json!({
                "product_id": product_id,
                "email": "a@example.com",
                "order_bump_ids": [bump_id],
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============ Checkout Flow Tests ============

#[tokio::test]
async fn test_checkout_full_price_without_coupon() {
    let stub_url = spawn_payment_stub().await;
    let state = create_test_app_state_with_provider(&stub_url);
    let product_id = {
        let conn = state.db.get().unwrap();
        create_test_product(&conn, "Course", 10000).id
    };

    let app = test_app(state.clone());
    let response = app
        .oneshot(post_json(
            "/api/checkout",
            serde_json::json!({ "product_id": product_id, "email": "Alice@Example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["subtotal_cents"], 10000);
    assert_eq!(body["discount_cents"], 0);
    assert_eq!(body["total_cents"], 10000);
    assert_eq!(body["checkout_url"], "https://pay.example/session");
    assert!(body.get("coupon_error").is_none());

    let session_id = body["session_id"].as_str().unwrap().to_string();
    let conn = state.db.get().unwrap();
    let session = queries::get_checkout_session(&conn, &session_id)
        .expect("query failed")
        .expect("session row should exist");
    assert_eq!(session.customer_email, "alice@example.com");
    assert_eq!(session.amount_cents, 10000);
    assert!(session.coupon_id.is_none());
    assert!(!session.completed);
    assert!(
        session.provider_session_id.is_some(),
        "provider id recorded after session creation"
    );
}

#[tokio::test]
async fn test_checkout_applies_coupon_across_bumps() {
    let stub_url = spawn_payment_stub().await;
    let state = create_test_app_state_with_provider(&stub_url);
    let (product_id, bump_id, coupon_id) = {
        let conn = state.db.get().unwrap();
        let product = create_test_product(&conn, "Course", 10000);
        let bump = create_test_order_bump(&conn, "Workbook", 2000);
        let coupon = create_test_coupon(&conn, &coupon_input("SAVE10"));
        (product.id, bump.id, coupon.id)
    };

    let app = test_app(state.clone());
    let response = app
        .oneshot(post_json(
            "/api/checkout",
            serde_json::json!({
                "product_id": product_id,
                "email": "alice@example.com",
                "coupon_code": "SAVE10",
                "order_bump_ids": [bump_id],
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["subtotal_cents"], 12000);
    assert_eq!(body["discount_cents"], 1200, "10% of the full subtotal");
    assert_eq!(body["total_cents"], 10800);

    let session_id = body["session_id"].as_str().unwrap().to_string();
    let conn = state.db.get().unwrap();
    let session = queries::get_checkout_session(&conn, &session_id)
        .expect("query failed")
        .expect("session row should exist");
    assert_eq!(session.coupon_id.as_deref(), Some(coupon_id.as_str()));
    assert_eq!(session.discount_cents, 1200);

    // The hold rides on the session for webhook-time finalization
    let reservation_id = session.reservation_id.expect("session carries the hold");
    let hold = queries::get_reservation_by_id(&conn, &reservation_id)
        .expect("query failed")
        .expect("hold should exist");
    assert_eq!(hold.status, ReservationStatus::Held);
    assert_eq!(hold.customer_email, "alice@example.com");
}

#[tokio::test]
async fn test_checkout_coupon_can_exclude_bumps() {
    let stub_url = spawn_payment_stub().await;
    let state = create_test_app_state_with_provider(&stub_url);
    let (product_id, bump_id) = {
        let conn = state.db.get().unwrap();
        let product = create_test_product(&conn, "Course", 10000);
        let bump = create_test_order_bump(&conn, "Workbook", 2000);
        let mut input = coupon_input("MAINONLY");
        input.exclude_order_bumps = true;
        create_test_coupon(&conn, &input);
        (product.id, bump.id)
    };

    let app = test_app(state);
    let response = app
        .oneshot(post_json(
            "/api/checkout",
            serde_json::json!({
                "product_id": product_id,
                "email": "alice@example.com",
                "coupon_code": "MAINONLY",
                "order_bump_ids": [bump_id],
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["subtotal_cents"], 12000);
    assert_eq!(body["discount_cents"], 1000, "10% of the main product only");
    assert_eq!(body["total_cents"], 11000);
}

#[tokio::test]
async fn test_checkout_proceeds_at_full_price_when_coupon_rejected() {
    let stub_url = spawn_payment_stub().await;
    let state = create_test_app_state_with_provider(&stub_url);
    let product_id = {
        let conn = state.db.get().unwrap();
        let product = create_test_product(&conn, "Course", 10000);
        let mut input = coupon_input("BYGONE");
        input.expires_at = Some(past_timestamp(1));
        create_test_coupon(&conn, &input);
        product.id
    };

    let app = test_app(state.clone());
    let response = app
        .oneshot(post_json(
            "/api/checkout",
            serde_json::json!({
                "product_id": product_id,
                "email": "alice@example.com",
                "coupon_code": "BYGONE",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK, "checkout survives the rejection");
    let body = body_json(response).await;
    assert_eq!(body["coupon_error"], "This coupon has expired");
    assert_eq!(body["discount_cents"], 0);
    assert_eq!(body["total_cents"], 10000);

    let session_id = body["session_id"].as_str().unwrap().to_string();
    let conn = state.db.get().unwrap();
    let session = queries::get_checkout_session(&conn, &session_id)
        .expect("query failed")
        .expect("session row should exist");
    assert!(session.coupon_id.is_none(), "rejected coupon is not attached");
    assert!(session.reservation_id.is_none());
}

// ============ Callback Tests ============

#[tokio::test]
async fn test_callback_redirects_pending_before_webhook() {
    let state = create_test_app_state();
    let session_id = {
        let conn = state.db.get().unwrap();
        let product = create_test_product(&conn, "Course", 10000);
        queries::create_checkout_session(
            &conn,
            &NewCheckoutSession {
                product_id: &product.id,
                customer_email: "a@example.com",
                amount_cents: 10000,
                discount_cents: 0,
                coupon_id: None,
                reservation_id: None,
            },
        )
        .unwrap()
        .id
    };

    let app = test_app(state);
    let response = app
        .oneshot(get(&format!("/api/checkout/callback?session={}", session_id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("redirect should carry a location");
    assert_eq!(
        location,
        format!(
            "http://localhost:3000/thanks?session={}&status=pending",
            session_id
        )
    );
}

#[tokio::test]
async fn test_callback_redirects_success_after_webhook() {
    let state = create_test_app_state();
    let session_id = {
        let conn = state.db.get().unwrap();
        let product = create_test_product(&conn, "Course", 10000);
        let session = queries::create_checkout_session(
            &conn,
            &NewCheckoutSession {
                product_id: &product.id,
                customer_email: "a@example.com",
                amount_cents: 10000,
                discount_cents: 0,
                coupon_id: None,
                reservation_id: None,
            },
        )
        .unwrap();
        assert!(queries::try_claim_checkout_session(&conn, &session.id).unwrap());
        session.id
    };

    let app = test_app(state);
    let response = app
        .oneshot(get(&format!("/api/checkout/callback?session={}", session_id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("redirect should carry a location");
    assert!(
        location.ends_with("&status=success"),
        "completed session redirects with status=success, got {}",
        location
    );
}

#[tokio::test]
async fn test_callback_unknown_session_is_not_found() {
    let app = test_app(create_test_app_state());

    let response = app
        .oneshot(get("/api/checkout/callback?session=nope"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

//! Test utilities and fixtures for GateFlow integration tests

#![allow(dead_code)]

use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

// Re-export the main library crate
pub use gateflow::config::RateLimitConfig;
pub use gateflow::coupons::{
    Admission, Finalization, RESERVATION_TTL_SECONDS, RedeemOutcome, RedeemRejection,
    VerifyOutcome, VerifyRejection, cleanup_expired_reservations, normalize_email,
    redeem_reservation, verify_coupon,
};
pub use gateflow::db::{AppState, init_db, queries};
pub use gateflow::handlers;
pub use gateflow::models::*;
pub use gateflow::payments::PaymentClient;

/// Webhook secret baked into every test state.
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test123secret456";

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Unique file path for tests that need several connections to one database
/// (the concurrency suites). Caller removes the file when done.
pub fn temp_db_path(tag: &str) -> String {
    std::env::temp_dir()
        .join(format!("gateflow_test_{}_{}.db", tag, uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned()
}

/// Open a connection to a shared file-backed test database with a busy
/// timeout, the way every worker thread in the concurrency tests does.
pub fn open_contended(db_path: &str) -> Connection {
    let conn = Connection::open(db_path).expect("failed to open test db");
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .expect("failed to set busy timeout");
    conn
}

// ============ Fixture Builders ============

/// Create a test product with default values
pub fn create_test_product(conn: &Connection, name: &str, price_cents: i64) -> Product {
    let input = CreateProduct {
        name: name.to_string(),
        price_cents,
        currency: None,
        is_order_bump: false,
    };
    queries::create_product(conn, &input).expect("Failed to create test product")
}

/// Create a test order-bump product
pub fn create_test_order_bump(conn: &Connection, name: &str, price_cents: i64) -> Product {
    let input = CreateProduct {
        name: name.to_string(),
        price_cents,
        currency: None,
        is_order_bump: true,
    };
    queries::create_product(conn, &input).expect("Failed to create test order bump")
}

/// Baseline coupon payload: 10% off, active, no limits, no restrictions.
/// Tests override the fields they care about.
pub fn coupon_input(code: &str) -> CreateCoupon {
    CreateCoupon {
        code: code.to_string(),
        discount_type: DiscountType::Percentage,
        discount_value: 10,
        usage_limit_global: None,
        usage_limit_per_user: None,
        current_usage_count: None,
        is_active: true,
        starts_at: None,
        expires_at: None,
        allowed_product_ids: None,
        allowed_emails: None,
        exclude_order_bumps: false,
    }
}

pub fn create_test_coupon(conn: &Connection, input: &CreateCoupon) -> Coupon {
    queries::create_coupon(conn, input).expect("Failed to create test coupon")
}

/// Coupon with usage limits, the shape most admission tests need
pub fn create_limited_coupon(
    conn: &Connection,
    code: &str,
    global: Option<i64>,
    per_user: Option<i64>,
) -> Coupon {
    let mut input = coupon_input(code);
    input.usage_limit_global = global;
    input.usage_limit_per_user = per_user;
    create_test_coupon(conn, &input)
}

// ============ Time Helpers ============

/// Get the current timestamp
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Get a future timestamp (days from now)
pub fn future_timestamp(days: i64) -> i64 {
    now() + (days * 86400)
}

/// Get a past timestamp (days ago)
pub fn past_timestamp(days: i64) -> i64 {
    now() - (days * 86400)
}

/// Push a reservation's deadline into the past without waiting for the TTL
pub fn force_expire_reservation(conn: &Connection, reservation_id: &str) {
    conn.execute(
        "UPDATE coupon_reservations SET expires_at = ?1 WHERE id = ?2",
        rusqlite::params![now() - 60, reservation_id],
    )
    .expect("failed to shift reservation expiry");
}

// ============ Outcome Unwrappers ============

pub fn expect_approved(outcome: VerifyOutcome) -> Admission {
    match outcome {
        VerifyOutcome::Approved(admission) => admission,
        VerifyOutcome::Rejected(rejection) => {
            panic!("expected approval, got rejection: {}", rejection)
        }
    }
}

pub fn expect_rejected(outcome: VerifyOutcome) -> VerifyRejection {
    match outcome {
        VerifyOutcome::Rejected(rejection) => rejection,
        VerifyOutcome::Approved(_) => panic!("expected rejection, got approval"),
    }
}

pub fn expect_finalized(outcome: RedeemOutcome) -> Finalization {
    match outcome {
        RedeemOutcome::Finalized(finalization) => finalization,
        RedeemOutcome::Rejected(rejection) => {
            panic!("expected finalization, got rejection: {}", rejection)
        }
    }
}

pub fn expect_redeem_rejected(outcome: RedeemOutcome) -> RedeemRejection {
    match outcome {
        RedeemOutcome::Rejected(rejection) => rejection,
        RedeemOutcome::Finalized(_) => panic!("expected rejection, got finalization"),
    }
}

// ============ App State & Router Fixtures ============

fn test_pool() -> gateflow::db::DbPool {
    // Pooled in-memory connections each open a private database, so the
    // pool is capped at one connection and fixtures must drop it before a
    // request runs.
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }
    pool
}

/// AppState with an in-memory database and no payment provider configured.
/// Checkout is refused up front; everything else works.
pub fn create_test_app_state() -> AppState {
    AppState {
        db: test_pool(),
        payments: PaymentClient::new("http://127.0.0.1:9", "", TEST_WEBHOOK_SECRET),
        base_url: "http://localhost:3000".to_string(),
        success_page_url: "http://localhost:3000/thanks".to_string(),
    }
}

/// AppState pointed at a live payment-provider stub (see [`spawn_payment_stub`])
pub fn create_test_app_state_with_provider(api_url: &str) -> AppState {
    AppState {
        db: test_pool(),
        payments: PaymentClient::new(api_url, "sk_test_xxx", TEST_WEBHOOK_SECRET),
        base_url: "http://localhost:3000".to_string(),
        success_page_url: "http://localhost:3000/thanks".to_string(),
    }
}

/// Create a Router with every endpoint mounted (rate limiting disabled)
pub fn test_app(state: AppState) -> Router {
    let limits = RateLimitConfig {
        enabled: false,
        strict_rpm: 10,
        standard_rpm: 30,
    };
    Router::new()
        .merge(handlers::public::router(limits))
        .merge(handlers::webhooks::router())
        .merge(handlers::admin::router())
        .with_state(state)
}

/// Minimal stand-in for the payment provider's session API: answers
/// `POST /v1/checkout/sessions` with a fresh session id and hosted URL,
/// which is all the checkout handler needs from the real thing.
pub async fn spawn_payment_stub() -> String {
    use axum::routing::post;

    async fn create_session() -> axum::Json<serde_json::Value> {
        axum::Json(serde_json::json!({
            "id": format!("ps_{}", uuid::Uuid::new_v4().simple()),
            "url": "https://pay.example/session",
        }))
    }

    let app = Router::new().route("/v1/checkout/sessions", post(create_session));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind payment stub");
    let addr = listener.local_addr().expect("stub has no local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("payment stub died");
    });
    format!("http://{}", addr)
}

/// Read a response body as JSON
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&bytes).expect("response body should be JSON")
}

/// Read a response body as plain text
pub async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    String::from_utf8(bytes.to_vec()).expect("response body should be UTF-8")
}

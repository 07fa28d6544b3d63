mod callback;
mod checkout;
mod verify;

pub use callback::*;
pub use checkout::*;
pub use verify::*;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::config::RateLimitConfig;
use crate::db::AppState;
use crate::rate_limit;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Buyer-facing routes. The two write endpoints get their own rate-limit
/// tiers; /health and the callback redirect are never limited.
pub fn router(limits: RateLimitConfig) -> Router<AppState> {
    let mut verify = Router::new().route("/api/coupons/verify", post(verify_coupon_code));
    let mut checkout = Router::new().route("/api/checkout", post(start_checkout));

    if limits.enabled {
        verify = verify.layer(rate_limit::standard_layer(limits.standard_rpm));
        checkout = checkout.layer(rate_limit::strict_layer(limits.strict_rpm));
    }

    Router::new()
        .route("/health", get(health))
        .route("/api/checkout/callback", get(payment_callback))
        .merge(verify)
        .merge(checkout)
}

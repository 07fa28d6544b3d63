mod coupons;
mod products;

pub use coupons::*;
pub use products::*;

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::db::AppState;

/// Management surface for the store operator: catalog upkeep, coupon rules,
/// the redemption ledger, and the manual reservation cleanup trigger.
///
/// Deployed behind a private network boundary; these routes carry no request
/// authentication of their own.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/products", post(create_product))
        .route("/admin/products", get(list_products))
        .route("/admin/coupons", post(create_coupon))
        .route("/admin/coupons", get(list_coupons))
        .route("/admin/coupons/cleanup", post(cleanup_reservations))
        .route("/admin/coupons/{id}", get(get_coupon))
        .route("/admin/coupons/{id}", put(update_coupon))
        .route("/admin/coupons/{id}", delete(delete_coupon))
        .route("/admin/coupons/{id}/redemptions", get(list_coupon_redemptions))
}

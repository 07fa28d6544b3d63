use axum::extract::State;
use serde::Serialize;

use crate::coupons::{self, VerifyOutcome};
use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::Json;
use crate::models::{CheckoutRequest, NewCheckoutSession};

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub checkout_url: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    /// Set when a coupon code was supplied but rejected. The checkout still
    /// goes through at full price; the storefront decides whether to stop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_error: Option<&'static str>,
}

pub async fn start_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    if !state.payments.is_configured() {
        return Err(AppError::BadRequest("No payment provider configured".into()));
    }

    let email = coupons::normalize_email(&request.email);
    if email.is_empty() {
        return Err(AppError::BadRequest(msg::EMAIL_EMPTY.into()));
    }

    let mut conn = state.db.get()?;

    let product = queries::get_product_by_id(&conn, &request.product_id)?
        .or_not_found(msg::PRODUCT_NOT_FOUND)?;
    if !product.active {
        return Err(AppError::BadRequest("Product is not available".into()));
    }

    let bump_ids: Vec<&str> = request.order_bump_ids.iter().map(String::as_str).collect();
    let bumps = queries::get_products_by_ids(&conn, &bump_ids)?;
    if bumps.len() != bump_ids.len() {
        return Err(AppError::BadRequest("Unknown order bump".into()));
    }
    for bump in &bumps {
        if !bump.is_order_bump || !bump.active {
            return Err(AppError::BadRequest(format!(
                "Product {} cannot be added as an order bump",
                bump.id
            )));
        }
        if bump.currency != product.currency {
            return Err(AppError::BadRequest(format!(
                "Order bump {} is priced in a different currency",
                bump.id
            )));
        }
    }

    let bump_cents: i64 = bumps.iter().map(|b| b.price_cents).sum();
    let subtotal = product.price_cents + bump_cents;

    // A rejected coupon is not a failed checkout. The customer may still
    // want the product; surface the reason and charge full price.
    let mut discount = 0;
    let mut coupon_error = None;
    let mut coupon_id = None;
    let mut reservation_id = None;

    if let Some(code) = request.coupon_code.as_deref().map(str::trim)
        && !code.is_empty()
    {
        match coupons::verify_coupon(&mut conn, code, &request.product_id, Some(&email))? {
            VerifyOutcome::Approved(admission) => {
                discount = admission
                    .coupon
                    .discount_cents(product.price_cents, bump_cents);
                coupon_id = Some(admission.coupon.id);
                reservation_id = admission.reservation.map(|r| r.id);
            }
            VerifyOutcome::Rejected(rejection) => {
                coupon_error = Some(rejection.user_message());
            }
        }
    }

    let total = subtotal - discount;

    let session = queries::create_checkout_session(
        &conn,
        &NewCheckoutSession {
            product_id: &request.product_id,
            customer_email: &email,
            amount_cents: total,
            discount_cents: discount,
            coupon_id: coupon_id.as_deref(),
            reservation_id: reservation_id.as_deref(),
        },
    )?;

    let callback_url = format!(
        "{}/api/checkout/callback?session={}",
        state.base_url, session.id
    );
    let cancel_url = format!("{}/cancel", state.base_url);

    let (provider_session_id, checkout_url) = state
        .payments
        .create_checkout_session(
            &session.id,
            &product.name,
            total,
            &product.currency,
            &email,
            &callback_url,
            &cancel_url,
        )
        .await?;

    queries::set_checkout_session_provider(&conn, &session.id, &provider_session_id)?;

    Ok(Json(CheckoutResponse {
        session_id: session.id,
        checkout_url,
        subtotal_cents: subtotal,
        discount_cents: discount,
        total_cents: total,
        coupon_error,
    }))
}

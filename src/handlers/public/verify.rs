use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::coupons::{self, VerifyOutcome};
use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;
use crate::models::DiscountType;

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub code: String,
    pub product_id: String,
    /// Optional this early in checkout; identity-dependent checks run again
    /// when the email is known.
    #[serde(default)]
    pub email: Option<String>,
}

/// Every verify call answers 200. Rejections are data, not HTTP errors:
/// `valid: false` plus a machine-readable reason code, so storefront UIs can
/// react without an exception path.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_reserved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_type: Option<DiscountType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_order_bumps: Option<bool>,
}

pub async fn verify_coupon_code(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>> {
    let mut conn = state.db.get()?;

    let outcome = coupons::verify_coupon(
        &mut conn,
        &request.code,
        &request.product_id,
        request.email.as_deref(),
    )?;

    let response = match outcome {
        VerifyOutcome::Approved(admission) => VerifyResponse {
            valid: true,
            error: None,
            message: None,
            already_reserved: Some(admission.already_reserved),
            reservation_id: admission.reservation.map(|r| r.id),
            discount_type: Some(admission.coupon.discount_type),
            discount_value: Some(admission.coupon.discount_value),
            exclude_order_bumps: Some(admission.coupon.exclude_order_bumps),
        },
        VerifyOutcome::Rejected(rejection) => VerifyResponse {
            valid: false,
            error: Some(rejection.as_str()),
            message: Some(rejection.user_message()),
            already_reserved: None,
            reservation_id: None,
            discount_type: None,
            discount_value: None,
            exclude_order_bumps: None,
        },
    };

    Ok(Json(response))
}

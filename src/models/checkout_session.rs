use serde::{Deserialize, Serialize};

/// One initiated purchase attempt, tracked from /api/checkout to webhook
/// completion. Carries the reservation reference so the payment webhook can
/// finalize the coupon in the same transaction that completes the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub product_id: String,
    pub customer_email: String,
    /// Final charge total in cents, after discount.
    pub amount_cents: i64,
    pub discount_cents: i64,
    pub coupon_id: Option<String>,
    pub reservation_id: Option<String>,
    /// Session id at the payment provider, once created there.
    pub provider_session_id: Option<String>,
    pub completed: bool,
    pub created_at: i64,
}

/// Insert payload for a checkout session row.
#[derive(Debug, Clone)]
pub struct NewCheckoutSession<'a> {
    pub product_id: &'a str,
    pub customer_email: &'a str,
    pub amount_cents: i64,
    pub discount_cents: i64,
    pub coupon_id: Option<&'a str>,
    pub reservation_id: Option<&'a str>,
}

/// Request body for POST /api/checkout.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub product_id: String,
    pub email: String,
    #[serde(default)]
    pub coupon_code: Option<String>,
    /// Additional order-bump product ids to attach to the purchase.
    #[serde(default)]
    pub order_bump_ids: Vec<String>,
}

use serde::{Deserialize, Serialize};

/// Permanent record of a coupon applied to a completed purchase. Append-only;
/// rows go away only when the owning coupon is deleted by an administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Redemption {
    pub id: String,
    pub coupon_id: String,
    pub customer_email: String,
    /// Discount actually applied, in cents.
    pub discount_amount: i64,
    pub created_at: i64,
}

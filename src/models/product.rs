use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result, msg};

/// A sellable item backing productId references in coupon checks and
/// discount math at checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Canonical price in cents.
    pub price_cents: i64,
    /// Currency code (e.g., "usd")
    pub currency: String,
    /// Order bumps are add-on line items offered during checkout; percentage
    /// coupons may be configured to leave them at full price.
    pub is_order_bump: bool,
    pub active: bool,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    pub price_cents: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub is_order_bump: bool,
}

impl CreateProduct {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest(msg::NAME_EMPTY.into()));
        }
        if self.price_cents < 0 {
            return Err(AppError::BadRequest(msg::PRICE_NEGATIVE.into()));
        }
        Ok(())
    }
}

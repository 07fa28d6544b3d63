use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, Result, msg};

/// Deserialize a double Option field where:
/// - Field absent in JSON → None (don't update)
/// - Field present with null → Some(None) (set to NULL in DB)
/// - Field present with value → Some(Some(value)) (set to value)
fn deserialize_optional_nullable<'de, D, T>(
    deserializer: D,
) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value: Option<T> = Option::deserialize(deserializer)?;
    Ok(Some(value))
}

/// How a coupon's discount_value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// discount_value is a percentage of the eligible amount (1-100)
    Percentage,
    /// discount_value is an absolute amount in cents
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::Fixed => "fixed",
        }
    }
}

impl std::str::FromStr for DiscountType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(Self::Percentage),
            "fixed" => Ok(Self::Fixed),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for DiscountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A discount rule with usage limits.
///
/// Capacity accounting: `current_usage_count` moves only when a reservation
/// is finalized into a redemption, never at reservation time. Live holds are
/// counted separately from the coupon_reservations table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: String,
    /// Canonical uppercase, unique. Lookups uppercase their input first.
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    /// Maximum total redemptions across all customers. None = unlimited.
    pub usage_limit_global: Option<i64>,
    /// Maximum redemptions per customer email. None = unlimited.
    pub usage_limit_per_user: Option<i64>,
    pub current_usage_count: i64,
    pub is_active: bool,
    /// Activation window start (unix seconds). None = active immediately.
    pub starts_at: Option<i64>,
    /// Activation window end (unix seconds). None = never expires.
    pub expires_at: Option<i64>,
    /// Product ids this coupon applies to. None or empty = any product.
    pub allowed_product_ids: Option<Vec<String>>,
    /// Lowercase emails this coupon is restricted to. None or empty = anyone.
    pub allowed_emails: Option<Vec<String>>,
    /// When true, percentage discounts apply to the main product only,
    /// leaving order-bump line items at full price.
    pub exclude_order_bumps: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Coupon {
    pub fn allows_product(&self, product_id: &str) -> bool {
        match &self.allowed_product_ids {
            Some(ids) if !ids.is_empty() => ids.iter().any(|id| id == product_id),
            _ => true,
        }
    }

    /// Case-insensitive membership check (`email` must already be lowercase).
    pub fn allows_email(&self, email: &str) -> bool {
        match &self.allowed_emails {
            Some(emails) if !emails.is_empty() => {
                emails.iter().any(|e| e.to_lowercase() == email)
            }
            _ => true,
        }
    }

    /// Computes the discount in cents for an order of `main_cents` plus
    /// `bump_cents` of order bumps.
    ///
    /// Percentage coupons with `exclude_order_bumps` set apply only to the
    /// main product; otherwise the percentage covers the whole subtotal.
    /// Fixed coupons are clamped to the subtotal so the total never goes
    /// negative. Fractional cents are truncated.
    pub fn discount_cents(&self, main_cents: i64, bump_cents: i64) -> i64 {
        let subtotal = main_cents + bump_cents;
        match self.discount_type {
            DiscountType::Percentage => {
                let base = if self.exclude_order_bumps {
                    main_cents
                } else {
                    subtotal
                };
                base * self.discount_value / 100
            }
            DiscountType::Fixed => self.discount_value.min(subtotal),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCoupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    #[serde(default)]
    pub usage_limit_global: Option<i64>,
    #[serde(default)]
    pub usage_limit_per_user: Option<i64>,
    /// Starting value for the usage counter. Nonzero pre-spends capacity,
    /// e.g. when migrating a coupon that was already used elsewhere.
    #[serde(default)]
    pub current_usage_count: Option<i64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub starts_at: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub allowed_product_ids: Option<Vec<String>>,
    #[serde(default)]
    pub allowed_emails: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_order_bumps: bool,
}

fn default_true() -> bool {
    true
}

impl CreateCoupon {
    /// Uppercased, trimmed form used for storage and lookups.
    pub fn canonical_code(&self) -> String {
        self.code.trim().to_uppercase()
    }

    pub fn validate(&self) -> Result<()> {
        let code = self.code.trim();
        if code.is_empty() {
            return Err(AppError::BadRequest(msg::COUPON_CODE_EMPTY.into()));
        }
        if !code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AppError::BadRequest(msg::COUPON_CODE_INVALID.into()));
        }
        validate_discount(self.discount_type, self.discount_value)?;
        validate_limits(self.usage_limit_global, self.usage_limit_per_user)?;
        if let Some(count) = self.current_usage_count
            && count < 0
        {
            return Err(AppError::BadRequest(msg::USAGE_COUNT_NEGATIVE.into()));
        }
        if let (Some(starts), Some(expires)) = (self.starts_at, self.expires_at)
            && starts >= expires
        {
            return Err(AppError::BadRequest(msg::COUPON_WINDOW_INVERTED.into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateCoupon {
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub usage_limit_global: Option<Option<i64>>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub usage_limit_per_user: Option<Option<i64>>,
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub starts_at: Option<Option<i64>>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub expires_at: Option<Option<i64>>,
    /// Use Some(None) or an empty list to clear the restriction.
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub allowed_product_ids: Option<Option<Vec<String>>>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub allowed_emails: Option<Option<Vec<String>>>,
    pub exclude_order_bumps: Option<bool>,
}

impl UpdateCoupon {
    pub fn validate(&self) -> Result<()> {
        if let (Some(discount_type), Some(value)) = (self.discount_type, self.discount_value) {
            validate_discount(discount_type, value)?;
        } else if let Some(value) = self.discount_value
            && value <= 0
        {
            return Err(AppError::BadRequest(msg::DISCOUNT_VALUE_INVALID.into()));
        }
        validate_limits(
            self.usage_limit_global.flatten(),
            self.usage_limit_per_user.flatten(),
        )?;
        Ok(())
    }
}

fn validate_discount(discount_type: DiscountType, value: i64) -> Result<()> {
    match discount_type {
        DiscountType::Percentage => {
            if !(1..=100).contains(&value) {
                return Err(AppError::BadRequest(msg::DISCOUNT_PERCENT_RANGE.into()));
            }
        }
        DiscountType::Fixed => {
            if value <= 0 {
                return Err(AppError::BadRequest(msg::DISCOUNT_VALUE_INVALID.into()));
            }
        }
    }
    Ok(())
}

fn validate_limits(global: Option<i64>, per_user: Option<i64>) -> Result<()> {
    if let Some(limit) = global
        && limit < 1
    {
        return Err(AppError::BadRequest(msg::USAGE_LIMIT_INVALID.into()));
    }
    if let Some(limit) = per_user
        && limit < 1
    {
        return Err(AppError::BadRequest(msg::USAGE_LIMIT_INVALID.into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coupon(discount_type: DiscountType, value: i64, exclude_bumps: bool) -> Coupon {
        Coupon {
            id: "c1".to_string(),
            code: "TEST".to_string(),
            discount_type,
            discount_value: value,
            usage_limit_global: None,
            usage_limit_per_user: None,
            current_usage_count: 0,
            is_active: true,
            starts_at: None,
            expires_at: None,
            allowed_product_ids: None,
            allowed_emails: None,
            exclude_order_bumps: exclude_bumps,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_percentage_discount_covers_whole_subtotal() {
        let c = coupon(DiscountType::Percentage, 10, false);
        assert_eq!(c.discount_cents(10000, 2000), 1200);
    }

    #[test]
    fn test_percentage_discount_excluding_bumps() {
        let c = coupon(DiscountType::Percentage, 10, true);
        // 10% of the main product only; the 2000-cent bump stays full price
        assert_eq!(c.discount_cents(10000, 2000), 1000);
    }

    #[test]
    fn test_percentage_discount_truncates_fractional_cents() {
        let c = coupon(DiscountType::Percentage, 33, false);
        // 33% of 101 cents = 33.33, truncated
        assert_eq!(c.discount_cents(101, 0), 33);
    }

    #[test]
    fn test_fixed_discount_clamped_to_subtotal() {
        let c = coupon(DiscountType::Fixed, 5000, false);
        assert_eq!(c.discount_cents(1000, 500), 1500, "never exceeds subtotal");
        assert_eq!(c.discount_cents(10000, 0), 5000);
    }

    #[test]
    fn test_fixed_discount_ignores_exclude_bumps_flag() {
        // The flag only changes the base of percentage discounts
        let c = coupon(DiscountType::Fixed, 3000, true);
        assert_eq!(c.discount_cents(10000, 2000), 3000);
    }

    #[test]
    fn test_allow_lists_empty_means_unrestricted() {
        let mut c = coupon(DiscountType::Fixed, 100, false);
        assert!(c.allows_product("anything"));
        assert!(c.allows_email("anyone@example.com"));

        c.allowed_product_ids = Some(vec![]);
        c.allowed_emails = Some(vec![]);
        assert!(c.allows_product("anything"), "[] means unrestricted");
        assert!(c.allows_email("anyone@example.com"), "[] means unrestricted");
    }

    #[test]
    fn test_allow_lists_membership() {
        let mut c = coupon(DiscountType::Fixed, 100, false);
        c.allowed_product_ids = Some(vec!["p1".to_string(), "p2".to_string()]);
        c.allowed_emails = Some(vec!["vip@example.com".to_string()]);

        assert!(c.allows_product("p2"));
        assert!(!c.allows_product("p3"));
        assert!(c.allows_email("vip@example.com"));
        assert!(!c.allows_email("other@example.com"));
    }

    #[test]
    fn test_email_allow_list_tolerates_mixed_case_entries() {
        // Admin-entered lists may not be lowercase; the lookup email is
        let mut c = coupon(DiscountType::Fixed, 100, false);
        c.allowed_emails = Some(vec!["VIP@Example.com".to_string()]);
        assert!(c.allows_email("vip@example.com"));
    }
}

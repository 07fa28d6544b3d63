use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::error::Result;
use crate::models::{Coupon, Reservation};

use super::{RESERVATION_TTL_SECONDS, normalize_email};

/// Why a verify call was turned down. All variants are expected,
/// caller-recoverable outcomes: checkout continues without the discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyRejection {
    NotFound,
    Inactive,
    NotStarted,
    Expired,
    ProductNotEligible,
    EmailNotEligible,
    GlobalLimitReached,
    PerUserLimitReached,
}

impl VerifyRejection {
    /// Stable machine-readable code used in API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Inactive => "inactive",
            Self::NotStarted => "not_started",
            Self::Expired => "expired",
            Self::ProductNotEligible => "product_not_eligible",
            Self::EmailNotEligible => "email_not_eligible",
            Self::GlobalLimitReached => "global_limit_reached",
            Self::PerUserLimitReached => "per_user_limit_reached",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound => "This coupon code does not exist",
            Self::Inactive => "This coupon is not active",
            Self::NotStarted => "This coupon is not valid yet",
            Self::Expired => "This coupon has expired",
            Self::ProductNotEligible => "This coupon does not apply to this product",
            Self::EmailNotEligible => "This coupon is not available for this email address",
            Self::GlobalLimitReached => "This coupon has been fully redeemed",
            Self::PerUserLimitReached => "You have already used this coupon",
        }
    }
}

impl std::fmt::Display for VerifyRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A granted admission: the coupon plus the hold backing it.
#[derive(Debug, Clone)]
pub struct Admission {
    pub coupon: Coupon,
    /// None when no email was supplied: the eligibility checks passed but no
    /// capacity was taken. The verify-with-email at checkout creates the
    /// real hold.
    pub reservation: Option<Reservation>,
    /// True when an existing live hold was returned instead of a new one.
    pub already_reserved: bool,
}

#[derive(Debug)]
pub enum VerifyOutcome {
    Approved(Admission),
    Rejected(VerifyRejection),
}

impl VerifyOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved(_))
    }
}

/// Decide whether this customer may hold one unit of the coupon's capacity.
///
/// Runs entirely inside an IMMEDIATE transaction: SQLite takes the write
/// lock up front, so two concurrent calls cannot both observe "one unit
/// left" and both reserve it. The same serialization makes the
/// count-then-insert sequence safe across server processes.
///
/// Check order: coupon exists and is active and inside its window, product
/// allow-list, email allow-list, global capacity (ledger plus live holds of
/// *other* customers, so a repeat verify is not counted against itself),
/// per-user redemption limit, then reuse-or-create the hold.
///
/// Email handling: the email is optional at this stage of checkout. Without
/// one, the restriction and per-user checks that need an identity are
/// deferred to the later verify-with-email, and no hold is created.
pub fn verify_coupon(
    conn: &mut Connection,
    code: &str,
    product_id: &str,
    email: Option<&str>,
) -> Result<VerifyOutcome> {
    let email = email.map(normalize_email).filter(|e| !e.is_empty());
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let now = Utc::now().timestamp();

    let Some(coupon) = queries::get_coupon_by_code(&tx, code)? else {
        return reject(tx, VerifyRejection::NotFound);
    };
    if !coupon.is_active {
        return reject(tx, VerifyRejection::Inactive);
    }
    if coupon.starts_at.is_some_and(|starts| now < starts) {
        return reject(tx, VerifyRejection::NotStarted);
    }
    if coupon.expires_at.is_some_and(|expires| now >= expires) {
        return reject(tx, VerifyRejection::Expired);
    }

    if !coupon.allows_product(product_id) {
        return reject(tx, VerifyRejection::ProductNotEligible);
    }
    if let Some(ref email) = email
        && !coupon.allows_email(email)
    {
        return reject(tx, VerifyRejection::EmailNotEligible);
    }

    if let Some(limit) = coupon.usage_limit_global {
        let ledger = queries::count_redemptions_for_coupon(&tx, &coupon.id)?;
        // The counter can run ahead of the ledger when a coupon is created
        // or adjusted with capacity already spent elsewhere.
        let permanent = ledger.max(coupon.current_usage_count);
        let live =
            queries::count_live_reservations_excluding(&tx, &coupon.id, email.as_deref(), now)?;
        if permanent + live >= limit {
            return reject(tx, VerifyRejection::GlobalLimitReached);
        }
    }

    let Some(email) = email else {
        // Precheck without identity: eligible, but nothing to key a hold on.
        tx.commit()?;
        return Ok(VerifyOutcome::Approved(Admission {
            coupon,
            reservation: None,
            already_reserved: false,
        }));
    };

    if let Some(limit) = coupon.usage_limit_per_user {
        let used = queries::count_redemptions_for_pair(&tx, &coupon.id, &email)?;
        // A finalized redemption always blocks, even with global capacity left.
        if used >= limit {
            return reject(tx, VerifyRejection::PerUserLimitReached);
        }
    }

    if let Some(existing) = queries::get_live_reservation(&tx, &coupon.id, &email, now)? {
        tx.commit()?;
        return Ok(VerifyOutcome::Approved(Admission {
            coupon,
            reservation: Some(existing),
            already_reserved: true,
        }));
    }

    // A stale held row would trip the one-live-hold unique index; flip it
    // before inserting the fresh hold.
    queries::expire_stale_reservation_for_pair(&tx, &coupon.id, &email, now)?;
    let reservation =
        queries::create_reservation(&tx, &coupon.id, &email, now + RESERVATION_TTL_SECONDS)?;
    tx.commit()?;

    Ok(VerifyOutcome::Approved(Admission {
        coupon,
        reservation: Some(reservation),
        already_reserved: false,
    }))
}

/// Commit before rejecting: lazy expiry flips done along the way should
/// stick even when the caller gets no reservation.
fn reject(tx: rusqlite::Transaction<'_>, rejection: VerifyRejection) -> Result<VerifyOutcome> {
    tx.commit()?;
    Ok(VerifyOutcome::Rejected(rejection))
}

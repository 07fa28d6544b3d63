use chrono::Utc;
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{Redemption, Reservation, ReservationStatus};

/// Why a finalize call was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemRejection {
    ReservationNotFound,
    /// The hold's TTL ran out between verify and payment completion. The
    /// caller must restart the verify flow.
    ReservationExpired,
    /// Double-finalize attempt. The first call already produced the
    /// redemption; this one must not increment anything.
    ReservationAlreadyConsumed,
    GlobalLimitReached,
    PerUserLimitReached,
}

impl RedeemRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReservationNotFound => "reservation_not_found",
            Self::ReservationExpired => "reservation_expired",
            Self::ReservationAlreadyConsumed => "reservation_already_consumed",
            Self::GlobalLimitReached => "global_limit_reached",
            Self::PerUserLimitReached => "per_user_limit_reached",
        }
    }
}

impl std::fmt::Display for RedeemRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A completed finalization: the ledger row plus the consumed hold.
#[derive(Debug, Clone)]
pub struct Finalization {
    pub redemption: Redemption,
    pub reservation: Reservation,
}

#[derive(Debug)]
pub enum RedeemOutcome {
    Finalized(Finalization),
    Rejected(RedeemRejection),
}

/// Convert a live hold into a permanent redemption.
///
/// One IMMEDIATE transaction covers the whole step: ledger insert, hold
/// flip to consumed, usage counter increment. A crash can never leave
/// "redeemed but not counted" or the reverse.
///
/// Expiry is re-checked here since time has passed since verify, and the
/// capacity limits are re-checked against the ledger: a hold that outlived
/// its window while a competitor redeemed must not push the ledger past the
/// limit once capacity has been re-issued.
pub fn redeem_reservation(
    conn: &mut Connection,
    reservation_id: &str,
    discount_amount: i64,
) -> Result<RedeemOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let outcome = redeem_in_tx(&tx, reservation_id, discount_amount)?;
    // Rejections commit too: a lazy expiry flip must stick.
    tx.commit()?;
    Ok(outcome)
}

/// Transaction-scoped body of [`redeem_reservation`], for callers that must
/// couple the redemption with other writes (the payment webhook claims its
/// event and redeems in one transaction). Never commits or rolls back; the
/// caller owns the transaction.
pub(crate) fn redeem_in_tx(
    tx: &Transaction,
    reservation_id: &str,
    discount_amount: i64,
) -> Result<RedeemOutcome> {
    if discount_amount < 0 {
        return Err(AppError::BadRequest(
            "Discount amount cannot be negative".into(),
        ));
    }

    let now = Utc::now().timestamp();

    let Some(reservation) = queries::get_reservation_by_id(tx, reservation_id)? else {
        return Ok(RedeemOutcome::Rejected(RedeemRejection::ReservationNotFound));
    };

    match reservation.status {
        ReservationStatus::Consumed => {
            return Ok(RedeemOutcome::Rejected(
                RedeemRejection::ReservationAlreadyConsumed,
            ));
        }
        ReservationStatus::Expired => {
            return Ok(RedeemOutcome::Rejected(RedeemRejection::ReservationExpired));
        }
        ReservationStatus::Held if reservation.expires_at <= now => {
            queries::expire_stale_reservation_for_pair(
                tx,
                &reservation.coupon_id,
                &reservation.customer_email,
                now,
            )?;
            return Ok(RedeemOutcome::Rejected(RedeemRejection::ReservationExpired));
        }
        ReservationStatus::Held => {}
    }

    let coupon = queries::get_coupon_by_id(tx, &reservation.coupon_id)?.ok_or_else(|| {
        AppError::Internal(format!(
            "Reservation {} references missing coupon {}",
            reservation.id, reservation.coupon_id
        ))
    })?;

    if let Some(limit) = coupon.usage_limit_global {
        let ledger = queries::count_redemptions_for_coupon(tx, &coupon.id)?;
        if ledger.max(coupon.current_usage_count) >= limit {
            return Ok(RedeemOutcome::Rejected(RedeemRejection::GlobalLimitReached));
        }
    }
    if let Some(limit) = coupon.usage_limit_per_user {
        let used =
            queries::count_redemptions_for_pair(tx, &coupon.id, &reservation.customer_email)?;
        if used >= limit {
            return Ok(RedeemOutcome::Rejected(RedeemRejection::PerUserLimitReached));
        }
    }

    // The status check above already validated the hold inside this
    // transaction; the conditional update is the airtight version of it.
    if !queries::try_consume_reservation(tx, &reservation.id, now)? {
        return Ok(RedeemOutcome::Rejected(
            RedeemRejection::ReservationAlreadyConsumed,
        ));
    }
    let redemption = queries::create_redemption(
        tx,
        &coupon.id,
        &reservation.customer_email,
        discount_amount,
    )?;
    queries::increment_coupon_usage(tx, &coupon.id)?;

    Ok(RedeemOutcome::Finalized(Finalization {
        redemption,
        reservation: Reservation {
            status: ReservationStatus::Consumed,
            ..reservation
        },
    }))
}

//! The coupon reservation manager.
//!
//! Three cooperating pieces keep limited-use coupons race-free under
//! concurrent checkouts:
//!
//! - admission: decides whether a verify call may create (or reuse) a hold,
//!   given global/per-user limits, live holds, and the redemption ledger
//! - finalize: converts a hold into a permanent redemption when payment
//!   completes
//! - sweeper: reclaims capacity from holds whose checkout was abandoned
//!
//! Correctness is enforced entirely through SQLite transactions, never
//! in-process locks, so it holds across independent server processes.

mod admission;
mod finalize;
mod sweeper;

pub use admission::{Admission, VerifyOutcome, VerifyRejection, verify_coupon};
pub use finalize::{Finalization, RedeemOutcome, RedeemRejection, redeem_reservation};
pub(crate) use finalize::redeem_in_tx;
pub use sweeper::{cleanup_expired_reservations, spawn_reservation_sweeper};

/// How long a hold keeps one unit of capacity for one customer before an
/// abandoned checkout returns it to the pool.
pub const RESERVATION_TTL_SECONDS: i64 = 10 * 60;

/// Customer identity key used by reservations and the redemption ledger.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

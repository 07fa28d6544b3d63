use serde::{Deserialize, Serialize};

/// Lifecycle state of a reservation. Stored explicitly, never inferred from
/// timestamp comparisons, so "never set" and "cleared" stay distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Live hold on one unit of coupon capacity.
    Held,
    /// Finalized into a redemption. Terminal.
    Consumed,
    /// TTL ran out before finalization. Terminal.
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Held => "held",
            Self::Consumed => "consumed",
            Self::Expired => "expired",
        }
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "held" => Ok(Self::Held),
            "consumed" => Ok(Self::Consumed),
            "expired" => Ok(Self::Expired),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A provisional, time-boxed claim on one unit of a coupon's capacity by one
/// customer. At most one `held` row exists per (coupon, email) pair; the
/// partial unique index enforces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub coupon_id: String,
    /// Normalized lowercase.
    pub customer_email: String,
    pub status: ReservationStatus,
    pub created_at: i64,
    pub expires_at: i64,
}

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Match status.
///
/// ```text
/// pending -> accepted -> paid -> confirmed -> in_transit -> delivered
///    |          |         |         |             |             |
///    +----------+---------+--> cancelled          +--> disputed <+
/// ```
///
/// `paid`, `confirmed`, `in_transit` and `delivered` can move to `disputed`.
/// A dispute resolves to `delivered` (release to traveler) or `cancelled`
/// (refund to sender).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Accepted,
    Paid,
    Confirmed,
    InTransit,
    Delivered,
    Disputed,
    Cancelled,
}

impl MatchStatus {
    pub const ALL: [MatchStatus; 8] = [
        MatchStatus::Pending,
        MatchStatus::Accepted,
        MatchStatus::Paid,
        MatchStatus::Confirmed,
        MatchStatus::InTransit,
        MatchStatus::Delivered,
        MatchStatus::Disputed,
        MatchStatus::Cancelled,
    ];

    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(MatchStatus::Pending),
            "accepted" => Ok(MatchStatus::Accepted),
            "paid" => Ok(MatchStatus::Paid),
            "confirmed" => Ok(MatchStatus::Confirmed),
            "in_transit" => Ok(MatchStatus::InTransit),
            "delivered" => Ok(MatchStatus::Delivered),
            "disputed" => Ok(MatchStatus::Disputed),
            "cancelled" => Ok(MatchStatus::Cancelled),
            _ => Err(format!("Invalid match status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::Accepted => "accepted",
            MatchStatus::Paid => "paid",
            MatchStatus::Confirmed => "confirmed",
            MatchStatus::InTransit => "in_transit",
            MatchStatus::Delivered => "delivered",
            MatchStatus::Disputed => "disputed",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    /// Human readable badge text
    pub fn label(&self) -> &'static str {
        match self {
            MatchStatus::Pending => "Awaiting response",
            MatchStatus::Accepted => "Awaiting payment",
            MatchStatus::Paid => "Paid, awaiting pickup",
            MatchStatus::Confirmed => "Picked up",
            MatchStatus::InTransit => "In transit",
            MatchStatus::Delivered => "Delivered",
            MatchStatus::Disputed => "In dispute",
            MatchStatus::Cancelled => "Cancelled",
        }
    }

    pub fn can_transition_to(&self, next: MatchStatus) -> bool {
        use MatchStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Cancelled)
                | (Accepted, Paid)
                | (Accepted, Cancelled)
                | (Paid, Confirmed)
                | (Paid, Disputed)
                | (Paid, Cancelled)
                | (Confirmed, InTransit)
                | (Confirmed, Disputed)
                | (InTransit, Delivered)
                | (InTransit, Disputed)
                | (Delivered, Disputed)
                | (Disputed, Delivered)
                | (Disputed, Cancelled)
                // withdrawing a dispute restores the earlier state
                | (Disputed, Paid)
                | (Disputed, Confirmed)
                | (Disputed, InTransit)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchStatus::Cancelled)
    }

    /// Holds trip capacity and blocks the parcel from other matches
    pub fn holds_capacity(&self) -> bool {
        !matches!(self, MatchStatus::Pending | MatchStatus::Cancelled)
    }

    /// Funds are in escrow while the match sits in one of these states
    pub fn has_escrow(&self) -> bool {
        matches!(
            self,
            MatchStatus::Paid
                | MatchStatus::Confirmed
                | MatchStatus::InTransit
                | MatchStatus::Delivered
                | MatchStatus::Disputed
        )
    }

    pub fn is_disputable(&self) -> bool {
        matches!(
            self,
            MatchStatus::Paid | MatchStatus::Confirmed | MatchStatus::InTransit | MatchStatus::Delivered
        )
    }

    /// Still work to do: not cancelled and not finished
    pub fn is_active(&self) -> bool {
        !matches!(self, MatchStatus::Cancelled | MatchStatus::Delivered)
    }
}

impl From<String> for MatchStatus {
    fn from(s: String) -> Self {
        Self::from_str(&s).unwrap_or(MatchStatus::Pending)
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pairing between a sender's parcel and a traveler's trip
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Match {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub parcel_id: Uuid,
    pub sender_id: Uuid,
    pub traveler_id: Uuid,
    pub requested_by: Uuid,
    pub agreed_price: Decimal,
    pub platform_fee: Decimal,
    pub status: String, // Stored as TEXT, use MatchStatus enum for type safety
    pub delivered_at: Option<NaiveDateTime>,
    pub cancelled_reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Match {
    pub fn status_enum(&self) -> MatchStatus {
        MatchStatus::from_str(&self.status).unwrap_or(MatchStatus::Pending)
    }

    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id || self.traveler_id == user_id
    }

    /// The user who must answer a pending request
    pub fn counterparty_of_requester(&self) -> Uuid {
        if self.requested_by == self.sender_id {
            self.traveler_id
        } else {
            self.sender_id
        }
    }

    /// What the sender pays into escrow
    pub fn total_price(&self) -> Decimal {
        self.agreed_price + self.platform_fee
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            MatchStatus::Pending,
            MatchStatus::Accepted,
            MatchStatus::Paid,
            MatchStatus::Confirmed,
            MatchStatus::InTransit,
            MatchStatus::Delivered,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_cancelled_is_terminal() {
        for next in MatchStatus::ALL {
            assert!(!MatchStatus::Cancelled.can_transition_to(next));
        }
        assert!(MatchStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_no_skipping_steps() {
        assert!(!MatchStatus::Pending.can_transition_to(MatchStatus::Paid));
        assert!(!MatchStatus::Accepted.can_transition_to(MatchStatus::InTransit));
        assert!(!MatchStatus::Confirmed.can_transition_to(MatchStatus::Cancelled));
        assert!(!MatchStatus::Delivered.can_transition_to(MatchStatus::Cancelled));
    }

    #[test]
    fn test_disputes() {
        assert!(!MatchStatus::Pending.is_disputable());
        assert!(!MatchStatus::Accepted.is_disputable());
        assert!(MatchStatus::Delivered.is_disputable());
        assert!(MatchStatus::Disputed.can_transition_to(MatchStatus::Delivered));
        assert!(MatchStatus::Disputed.can_transition_to(MatchStatus::Cancelled));
    }

    #[test]
    fn test_round_trip_strings() {
        for status in MatchStatus::ALL {
            assert_eq!(MatchStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(MatchStatus::from_str("shipped").is_err());
    }
}

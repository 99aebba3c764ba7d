use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Escrow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    Held,
    Released,
    Refunded,
    Disputed,
}

impl EscrowStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "held" => Ok(EscrowStatus::Held),
            "released" => Ok(EscrowStatus::Released),
            "refunded" => Ok(EscrowStatus::Refunded),
            "disputed" => Ok(EscrowStatus::Disputed),
            _ => Err(format!("Invalid escrow status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Held => "held",
            EscrowStatus::Released => "released",
            EscrowStatus::Refunded => "refunded",
            EscrowStatus::Disputed => "disputed",
        }
    }

    pub fn can_transition_to(&self, next: EscrowStatus) -> bool {
        use EscrowStatus::*;
        matches!(
            (self, next),
            (Held, Released)
                | (Held, Refunded)
                | (Held, Disputed)
                | (Disputed, Held)
                | (Disputed, Released)
                | (Disputed, Refunded)
        )
    }
}

impl From<String> for EscrowStatus {
    fn from(s: String) -> Self {
        Self::from_str(&s).unwrap_or(EscrowStatus::Held)
    }
}

/// Funds held by the platform for one match
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EscrowRecord {
    pub id: Uuid,
    pub match_id: Uuid,
    pub sender_id: Uuid,
    pub traveler_id: Uuid,
    pub amount: Decimal,
    pub traveler_payout: Decimal,
    pub platform_fee: Decimal,
    pub status: String, // Stored as TEXT, use EscrowStatus enum for type safety
    pub payment_reference: String,
    pub held_at: NaiveDateTime,
    pub auto_release_at: Option<NaiveDateTime>,
    pub released_at: Option<NaiveDateTime>,
    pub refunded_at: Option<NaiveDateTime>,
}

impl EscrowRecord {
    pub fn status_enum(&self) -> EscrowStatus {
        EscrowStatus::from_str(&self.status).unwrap_or(EscrowStatus::Held)
    }

    pub fn is_held(&self) -> bool {
        self.status_enum() == EscrowStatus::Held
    }

    pub fn is_due_for_release(&self, now: NaiveDateTime) -> bool {
        self.is_held() && self.auto_release_at.map(|at| at <= now).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_states_are_final() {
        for next in [
            EscrowStatus::Held,
            EscrowStatus::Released,
            EscrowStatus::Refunded,
            EscrowStatus::Disputed,
        ] {
            assert!(!EscrowStatus::Released.can_transition_to(next));
            assert!(!EscrowStatus::Refunded.can_transition_to(next));
        }
    }

    #[test]
    fn test_dispute_round_trip() {
        assert!(EscrowStatus::Held.can_transition_to(EscrowStatus::Disputed));
        assert!(EscrowStatus::Disputed.can_transition_to(EscrowStatus::Held));
        assert!(EscrowStatus::Disputed.can_transition_to(EscrowStatus::Refunded));
    }
}

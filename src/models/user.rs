use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// What a user does on the marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Sender,
    Traveler,
    Both,
}

impl UserRole {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "sender" => Ok(UserRole::Sender),
            "traveler" => Ok(UserRole::Traveler),
            "both" => Ok(UserRole::Both),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Sender => "sender",
            UserRole::Traveler => "traveler",
            UserRole::Both => "both",
        }
    }

    pub fn can_send(&self) -> bool {
        matches!(self, UserRole::Sender | UserRole::Both)
    }

    pub fn can_travel(&self) -> bool {
        matches!(self, UserRole::Traveler | UserRole::Both)
    }
}

impl From<String> for UserRole {
    fn from(s: String) -> Self {
        Self::from_str(&s).unwrap_or(UserRole::Both)
    }
}

/// Know-Your-Customer verification state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    NotStarted,
    Pending,
    Verified,
    Rejected,
}

impl KycStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "not_started" => Ok(KycStatus::NotStarted),
            "pending" => Ok(KycStatus::Pending),
            "verified" => Ok(KycStatus::Verified),
            "rejected" => Ok(KycStatus::Rejected),
            _ => Err(format!("Invalid KYC status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            KycStatus::NotStarted => "not_started",
            KycStatus::Pending => "pending",
            KycStatus::Verified => "verified",
            KycStatus::Rejected => "rejected",
        }
    }

    /// Submissions go to pending; only a pending review can be decided
    pub fn can_transition_to(&self, next: KycStatus) -> bool {
        matches!(
            (self, next),
            (KycStatus::NotStarted, KycStatus::Pending)
                | (KycStatus::Rejected, KycStatus::Pending)
                | (KycStatus::Pending, KycStatus::Verified)
                | (KycStatus::Pending, KycStatus::Rejected)
        )
    }
}

impl From<String> for KycStatus {
    fn from(s: String) -> Self {
        Self::from_str(&s).unwrap_or(KycStatus::NotStarted)
    }
}

/// Registered marketplace user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: String, // Stored as TEXT, use UserRole enum for type safety
    pub kyc_status: String, // Stored as TEXT, use KycStatus enum for type safety
    pub rating: Option<Decimal>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn role_enum(&self) -> UserRole {
        UserRole::from_str(&self.role).unwrap_or(UserRole::Both)
    }

    pub fn kyc_enum(&self) -> KycStatus {
        KycStatus::from_str(&self.kyc_status).unwrap_or(KycStatus::NotStarted)
    }

    pub fn is_kyc_verified(&self) -> bool {
        self.kyc_enum() == KycStatus::Verified
    }
}

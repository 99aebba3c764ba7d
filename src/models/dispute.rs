use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Why a party opened a dispute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeReason {
    Damaged,
    Lost,
    NotDelivered,
    Late,
    WrongItem,
    Other,
}

impl DisputeReason {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "damaged" => Ok(DisputeReason::Damaged),
            "lost" => Ok(DisputeReason::Lost),
            "not_delivered" => Ok(DisputeReason::NotDelivered),
            "late" => Ok(DisputeReason::Late),
            "wrong_item" => Ok(DisputeReason::WrongItem),
            "other" => Ok(DisputeReason::Other),
            _ => Err(format!("Invalid dispute reason: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeReason::Damaged => "damaged",
            DisputeReason::Lost => "lost",
            DisputeReason::NotDelivered => "not_delivered",
            DisputeReason::Late => "late",
            DisputeReason::WrongItem => "wrong_item",
            DisputeReason::Other => "other",
        }
    }
}

/// Dispute status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    UnderReview,
    Resolved,
    Withdrawn,
}

impl DisputeStatus {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "open" => Ok(DisputeStatus::Open),
            "under_review" => Ok(DisputeStatus::UnderReview),
            "resolved" => Ok(DisputeStatus::Resolved),
            "withdrawn" => Ok(DisputeStatus::Withdrawn),
            _ => Err(format!("Invalid dispute status: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Open => "open",
            DisputeStatus::UnderReview => "under_review",
            DisputeStatus::Resolved => "resolved",
            DisputeStatus::Withdrawn => "withdrawn",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, DisputeStatus::Open | DisputeStatus::UnderReview)
    }
}

impl From<String> for DisputeStatus {
    fn from(s: String) -> Self {
        Self::from_str(&s).unwrap_or(DisputeStatus::Open)
    }
}

/// How an admin settled a dispute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeResolution {
    RefundSender,
    ReleaseToTraveler,
}

impl DisputeResolution {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "refund_sender" => Ok(DisputeResolution::RefundSender),
            "release_to_traveler" => Ok(DisputeResolution::ReleaseToTraveler),
            _ => Err(format!("Invalid dispute resolution: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeResolution::RefundSender => "refund_sender",
            DisputeResolution::ReleaseToTraveler => "release_to_traveler",
        }
    }
}

/// A disagreement about a paid match
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Dispute {
    pub id: Uuid,
    pub match_id: Uuid,
    pub opened_by: Uuid,
    pub reason: String,
    pub description: String,
    pub status: String, // Stored as TEXT, use DisputeStatus enum for type safety
    pub previous_match_status: String,
    pub resolution: Option<String>,
    pub resolution_note: Option<String>,
    pub created_at: NaiveDateTime,
    pub resolved_at: Option<NaiveDateTime>,
}

impl Dispute {
    pub fn status_enum(&self) -> DisputeStatus {
        DisputeStatus::from_str(&self.status).unwrap_or(DisputeStatus::Open)
    }

    pub fn resolution_enum(&self) -> Option<DisputeResolution> {
        self.resolution
            .as_deref()
            .and_then(|r| DisputeResolution::from_str(r).ok())
    }

    pub fn is_open(&self) -> bool {
        self.status_enum().is_open()
    }
}

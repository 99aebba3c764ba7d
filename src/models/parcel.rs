use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Parcel status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParcelStatus {
    Open,
    Matched,
    InTransit,
    Delivered,
    Cancelled,
}

impl ParcelStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "open" => Ok(ParcelStatus::Open),
            "matched" => Ok(ParcelStatus::Matched),
            "in_transit" => Ok(ParcelStatus::InTransit),
            "delivered" => Ok(ParcelStatus::Delivered),
            "cancelled" => Ok(ParcelStatus::Cancelled),
            _ => Err(format!("Invalid parcel status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            ParcelStatus::Open => "open",
            ParcelStatus::Matched => "matched",
            ParcelStatus::InTransit => "in_transit",
            ParcelStatus::Delivered => "delivered",
            ParcelStatus::Cancelled => "cancelled",
        }
    }
}

impl From<String> for ParcelStatus {
    fn from(s: String) -> Self {
        Self::from_str(&s).unwrap_or(ParcelStatus::Open)
    }
}

/// What is inside the parcel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParcelCategory {
    Documents,
    Electronics,
    Clothing,
    Food,
    Other,
}

impl ParcelCategory {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "documents" => Ok(ParcelCategory::Documents),
            "electronics" => Ok(ParcelCategory::Electronics),
            "clothing" => Ok(ParcelCategory::Clothing),
            "food" => Ok(ParcelCategory::Food),
            "other" => Ok(ParcelCategory::Other),
            _ => Err(format!("Invalid parcel category: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParcelCategory::Documents => "documents",
            ParcelCategory::Electronics => "electronics",
            ParcelCategory::Clothing => "clothing",
            ParcelCategory::Food => "food",
            ParcelCategory::Other => "other",
        }
    }
}

/// A sender's package waiting to be carried
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Parcel {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub weight_kg: Decimal,
    pub declared_value: Decimal,
    pub category: String,
    pub origin_city: String,
    pub origin_country: String,
    pub destination_city: String,
    pub destination_country: String,
    pub deliver_by: Option<NaiveDate>,
    pub offered_reward: Decimal,
    pub status: String, // Stored as TEXT, use ParcelStatus enum for type safety
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Parcel {
    pub fn status_enum(&self) -> ParcelStatus {
        ParcelStatus::from_str(&self.status).unwrap_or(ParcelStatus::Open)
    }

    pub fn is_open(&self) -> bool {
        self.status_enum() == ParcelStatus::Open
    }

    pub fn is_cross_border(&self) -> bool {
        !self.origin_country.eq_ignore_ascii_case(&self.destination_country)
    }

    /// A trip departing after the deadline cannot deliver in time
    pub fn deadline_allows(&self, departure: NaiveDate) -> bool {
        self.deliver_by.map(|by| departure <= by).unwrap_or(true)
    }
}

/// Filters accepted by the open-parcel marketplace search
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParcelSearch {
    pub origin_country: Option<String>,
    pub destination_country: Option<String>,
    pub max_weight_kg: Option<Decimal>,
    pub min_reward: Option<Decimal>,
    pub category: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ParcelSearch {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    pub fn normalized(&self) -> Self {
        let norm = |v: &Option<String>| {
            v.as_ref()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
        };
        Self {
            origin_country: norm(&self.origin_country),
            destination_country: norm(&self.destination_country),
            max_weight_kg: self.max_weight_kg,
            min_reward: self.min_reward,
            category: norm(&self.category),
            limit: Some(
                self.limit
                    .unwrap_or(Self::DEFAULT_LIMIT)
                    .clamp(1, Self::MAX_LIMIT),
            ),
            offset: Some(self.offset.unwrap_or(0).max(0)),
        }
    }
}

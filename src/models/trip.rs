use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Trip status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Active,
    Full,
    Completed,
    Cancelled,
    Expired,
}

impl TripStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "active" => Ok(TripStatus::Active),
            "full" => Ok(TripStatus::Full),
            "completed" => Ok(TripStatus::Completed),
            "cancelled" => Ok(TripStatus::Cancelled),
            "expired" => Ok(TripStatus::Expired),
            _ => Err(format!("Invalid trip status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Active => "active",
            TripStatus::Full => "full",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
            TripStatus::Expired => "expired",
        }
    }

    /// A trip still listed on the marketplace
    pub fn is_open(&self) -> bool {
        matches!(self, TripStatus::Active | TripStatus::Full)
    }
}

impl From<String> for TripStatus {
    fn from(s: String) -> Self {
        Self::from_str(&s).unwrap_or(TripStatus::Active)
    }
}

/// A traveler's journey with spare luggage capacity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Trip {
    pub id: Uuid,
    pub traveler_id: Uuid,
    pub origin_city: String,
    pub origin_country: String,
    pub destination_city: String,
    pub destination_country: String,
    pub departure_date: NaiveDate,
    pub arrival_date: Option<NaiveDate>,
    pub capacity_kg: Decimal,
    pub remaining_kg: Decimal,
    pub price_per_kg: Decimal,
    pub status: String, // Stored as TEXT, use TripStatus enum for type safety
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Trip {
    pub fn status_enum(&self) -> TripStatus {
        TripStatus::from_str(&self.status).unwrap_or(TripStatus::Active)
    }

    pub fn is_active(&self) -> bool {
        self.status_enum() == TripStatus::Active
    }

    pub fn reserved_kg(&self) -> Decimal {
        self.capacity_kg - self.remaining_kg
    }

    /// Whether a parcel travelling between these countries fits this route
    pub fn serves_route(&self, origin_country: &str, destination_country: &str) -> bool {
        self.origin_country.eq_ignore_ascii_case(origin_country)
            && self.destination_country.eq_ignore_ascii_case(destination_country)
    }

    pub fn can_carry(&self, weight_kg: Decimal) -> bool {
        self.is_active() && weight_kg > Decimal::ZERO && weight_kg <= self.remaining_kg
    }
}

/// Filters accepted by the trip marketplace search
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TripSearch {
    pub origin_country: Option<String>,
    pub origin_city: Option<String>,
    pub destination_country: Option<String>,
    pub destination_city: Option<String>,
    pub departure_from: Option<NaiveDate>,
    pub departure_to: Option<NaiveDate>,
    pub min_weight_kg: Option<Decimal>,
    pub max_price_per_kg: Option<Decimal>,
    pub sort: Option<TripSort>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TripSort {
    DepartureAsc,
    PriceAsc,
    CapacityDesc,
}

impl TripSort {
    pub fn order_by(&self) -> &'static str {
        match self {
            TripSort::DepartureAsc => "departure_date ASC, created_at DESC",
            TripSort::PriceAsc => "price_per_kg ASC, departure_date ASC",
            TripSort::CapacityDesc => "remaining_kg DESC, departure_date ASC",
        }
    }
}

impl TripSearch {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    /// Clamp paging and normalize text filters so equal searches compare equal
    pub fn normalized(&self) -> Self {
        let norm = |v: &Option<String>| {
            v.as_ref()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
        };
        Self {
            origin_country: norm(&self.origin_country),
            origin_city: norm(&self.origin_city),
            destination_country: norm(&self.destination_country),
            destination_city: norm(&self.destination_city),
            departure_from: self.departure_from,
            departure_to: self.departure_to,
            min_weight_kg: self.min_weight_kg,
            max_price_per_kg: self.max_price_per_kg,
            sort: Some(self.sort.unwrap_or(TripSort::DepartureAsc)),
            limit: Some(
                self.limit
                    .unwrap_or(Self::DEFAULT_LIMIT)
                    .clamp(1, Self::MAX_LIMIT),
            ),
            offset: Some(self.offset.unwrap_or(0).max(0)),
        }
    }
}

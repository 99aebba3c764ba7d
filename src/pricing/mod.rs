use crate::config::PricingConfig;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Heaviest parcel a traveler may be asked to carry
pub const MAX_WEIGHT_KG: Decimal = Decimal::from_parts(50, 0, 0, false, 0);

/// Highest per-kg rate a trip may charge
pub const MAX_RATE_PER_KG: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

/// Longest route a distance fee is computed for
pub const MAX_DISTANCE_KM: Decimal = Decimal::from_parts(50_000, 0, 0, false, 0);

/// Error types for price estimation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    #[error("Invalid weight: {0}")]
    InvalidWeight(String),

    #[error("Invalid distance: {0}")]
    InvalidDistance(String),

    #[error("Invalid rate: {0}")]
    InvalidRate(String),

    #[error("Invalid route: {0}")]
    InvalidRoute(String),
}

pub type PricingResult<T> = Result<T, PricingError>;

/// Inputs for a delivery price estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuery {
    pub weight_kg: Decimal,
    #[serde(default)]
    pub distance_km: Option<Decimal>,
    pub origin_country: String,
    pub destination_country: String,
    /// Trip-specific rate; falls back to the configured default
    #[serde(default)]
    pub rate_per_kg: Option<Decimal>,
}

/// Price breakdown; every amount is rounded to cents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEstimate {
    pub weight_kg: Decimal,
    pub rate_per_kg: Decimal,
    pub base_price: Decimal,
    pub distance_fee: Decimal,
    pub subtotal: Decimal,
    pub platform_fee: Decimal,
    pub total: Decimal,
    pub cross_border: bool,
    pub minimum_applied: bool,
}

impl PriceEstimate {
    /// What the traveler receives once escrow is released
    pub fn traveler_payout(&self) -> Decimal {
        self.subtotal
    }
}

/// Round a money amount to cents, halves away from zero
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Delivery price calculator
///
/// `base = weight * rate`, plus either a per-km distance fee or a flat
/// domestic/cross-border fee, floored at the minimum price. The platform fee
/// is a percentage of that subtotal and is paid on top by the sender.
#[derive(Debug, Clone)]
pub struct PriceEstimator {
    config: PricingConfig,
}

impl PriceEstimator {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    pub fn estimate(&self, query: &PriceQuery) -> PricingResult<PriceEstimate> {
        validate_weight(query.weight_kg)?;

        let origin = query.origin_country.trim();
        let destination = query.destination_country.trim();
        if origin.is_empty() || destination.is_empty() {
            return Err(PricingError::InvalidRoute(
                "Origin and destination countries are required".to_string(),
            ));
        }

        let rate = query.rate_per_kg.unwrap_or(self.config.rate_per_kg);
        validate_rate(rate)?;

        let cross_border = !origin.eq_ignore_ascii_case(destination);
        let base_price = query
            .weight_kg
            .checked_mul(rate)
            .ok_or_else(|| PricingError::InvalidRate("Rate per kg is out of range".to_string()))?;

        let distance_fee = match query.distance_km {
            Some(km) if km < Decimal::ZERO => {
                return Err(PricingError::InvalidDistance(
                    "Distance must not be negative".to_string(),
                ))
            }
            Some(km) if km > MAX_DISTANCE_KM => {
                return Err(PricingError::InvalidDistance(format!(
                    "Distance must not exceed {} km",
                    MAX_DISTANCE_KM
                )))
            }
            Some(km) => km.checked_mul(self.config.rate_per_km).ok_or_else(|| {
                PricingError::InvalidDistance("Distance is out of range".to_string())
            })?,
            None if cross_border => self.config.cross_border_flat,
            None => self.config.domestic_flat,
        };

        let raw_subtotal = base_price
            .checked_add(distance_fee)
            .ok_or_else(|| PricingError::InvalidRate("Price is out of range".to_string()))?;
        let minimum_applied = raw_subtotal < self.config.minimum_price;
        let subtotal = round_money(raw_subtotal.max(self.config.minimum_price));
        let platform_fee = self.platform_fee(subtotal)?;
        let total = subtotal
            .checked_add(platform_fee)
            .ok_or_else(|| PricingError::InvalidRate("Price is out of range".to_string()))?;

        Ok(PriceEstimate {
            weight_kg: query.weight_kg,
            rate_per_kg: rate,
            base_price: round_money(base_price),
            distance_fee: round_money(distance_fee),
            subtotal,
            platform_fee,
            total,
            cross_border,
            minimum_applied,
        })
    }

    /// Platform commission on an agreed price
    pub fn platform_fee(&self, agreed_price: Decimal) -> PricingResult<Decimal> {
        agreed_price
            .checked_mul(self.config.platform_fee_percent)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
            .map(round_money)
            .ok_or_else(|| PricingError::InvalidRate("Platform fee is out of range".to_string()))
    }
}

/// Per-kg rates must be between zero and `MAX_RATE_PER_KG`
pub fn validate_rate(rate: Decimal) -> PricingResult<()> {
    if rate < Decimal::ZERO {
        return Err(PricingError::InvalidRate("Rate per kg must not be negative".to_string()));
    }
    if rate > MAX_RATE_PER_KG {
        return Err(PricingError::InvalidRate(format!(
            "Rate per kg must not exceed {}",
            MAX_RATE_PER_KG
        )));
    }
    Ok(())
}

/// Parcel weights must be positive and at most `MAX_WEIGHT_KG`
pub fn validate_weight(weight_kg: Decimal) -> PricingResult<()> {
    if weight_kg <= Decimal::ZERO {
        return Err(PricingError::InvalidWeight("Weight must be positive".to_string()));
    }
    if weight_kg > MAX_WEIGHT_KG {
        return Err(PricingError::InvalidWeight(format!(
            "Weight must not exceed {} kg",
            MAX_WEIGHT_KG
        )));
    }
    Ok(())
}

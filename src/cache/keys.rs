//! Cache key builders and TTL tiers.
//!
//! Keys are built here and nowhere else so that writers and invalidators
//! always agree on the exact spelling.

use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Fixed TTL buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTtl {
    /// 5 minutes
    Short,
    /// 30 minutes
    Medium,
    /// 1 hour
    Long,
    /// 24 hours
    Daily,
    /// 7 days
    Weekly,
}

impl CacheTtl {
    pub fn as_secs(&self) -> u64 {
        match self {
            CacheTtl::Short => 300,
            CacheTtl::Medium => 1800,
            CacheTtl::Long => 3600,
            CacheTtl::Daily => 86_400,
            CacheTtl::Weekly => 604_800,
        }
    }
}

/// Deterministic cache key builders
pub struct CacheKeys;

impl CacheKeys {
    pub fn trip(id: Uuid) -> String {
        format!("trip:{}", id)
    }

    pub fn trip_search<T: Serialize>(query: &T) -> String {
        format!("trips_search:{}", Self::digest(query))
    }

    pub fn all_trip_searches() -> &'static str {
        "trips_search:*"
    }

    pub fn trip_views(id: Uuid) -> String {
        format!("trip_views:{}", id)
    }

    pub fn trip_viewers(id: Uuid) -> String {
        format!("trip_viewers:{}", id)
    }

    pub fn parcel(id: Uuid) -> String {
        format!("parcel:{}", id)
    }

    pub fn parcel_search<T: Serialize>(query: &T) -> String {
        format!("parcels_search:{}", Self::digest(query))
    }

    pub fn all_parcel_searches() -> &'static str {
        "parcels_search:*"
    }

    pub fn match_record(id: Uuid) -> String {
        format!("match:{}", id)
    }

    pub fn escrow(match_id: Uuid) -> String {
        format!("escrow:{}", match_id)
    }

    pub fn user(id: Uuid) -> String {
        format!("user:{}", id)
    }

    pub fn user_dashboard(user_id: Uuid) -> String {
        format!("user_dashboard:{}", user_id)
    }

    pub fn user_trips(user_id: Uuid) -> String {
        format!("user_trips:{}", user_id)
    }

    pub fn user_parcels(user_id: Uuid) -> String {
        format!("user_parcels:{}", user_id)
    }

    pub fn user_matches(user_id: Uuid) -> String {
        format!("user_matches:{}", user_id)
    }

    pub fn wallet(user_id: Uuid) -> String {
        format!("wallet:{}", user_id)
    }

    pub fn price_estimate<T: Serialize>(query: &T) -> String {
        format!("price_estimate:{}", Self::digest(query))
    }

    pub fn rate_limit(user_id: Uuid, action: &str) -> String {
        format!("rate_limit:{}:{}", user_id, action)
    }

    /// Every per-user key that summarises the user's own listings and money
    pub fn user_scope(user_id: Uuid) -> Vec<String> {
        vec![
            Self::user_dashboard(user_id),
            Self::user_trips(user_id),
            Self::user_parcels(user_id),
            Self::user_matches(user_id),
            Self::wallet(user_id),
        ]
    }

    /// Hex SHA-256 of the JSON form of `value`
    pub fn digest<T: Serialize>(value: &T) -> String {
        let bytes = serde_json::to_vec(value).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ttl_tiers() {
        assert_eq!(CacheTtl::Short.as_secs(), 300);
        assert_eq!(CacheTtl::Medium.as_secs(), 1800);
        assert_eq!(CacheTtl::Long.as_secs(), 3600);
        assert_eq!(CacheTtl::Daily.as_secs(), 86400);
        assert_eq!(CacheTtl::Weekly.as_secs(), 604800);
    }

    #[test]
    fn test_key_shapes() {
        let id = Uuid::nil();
        assert_eq!(CacheKeys::trip(id), "trip:00000000-0000-0000-0000-000000000000");
        assert_eq!(
            CacheKeys::user_dashboard(id),
            "user_dashboard:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            CacheKeys::rate_limit(id, "match_request"),
            "rate_limit:00000000-0000-0000-0000-000000000000:match_request"
        );
    }

    #[test]
    fn test_search_keys_are_deterministic() {
        let a = CacheKeys::trip_search(&json!({"origin": "ke", "limit": 20}));
        let b = CacheKeys::trip_search(&json!({"origin": "ke", "limit": 20}));
        let c = CacheKeys::trip_search(&json!({"origin": "ug", "limit": 20}));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("trips_search:"));
        assert_eq!(a.len(), "trips_search:".len() + 64);
    }
}

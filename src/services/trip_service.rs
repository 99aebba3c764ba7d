use crate::cache::{CacheKeys, CacheService, CacheTtl};
use crate::error::{AppError, AppResult};
use crate::models::{MatchStatus, Trip, TripSearch, TripStatus};
use crate::pricing::validate_rate;
use crate::repositories::{MatchRepository, NewTrip, TripChanges, TripRepository, UserRepository};
use crate::websocket::WebSocketServer;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Largest capacity a single trip may offer
const MAX_TRIP_CAPACITY_KG: i64 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTrip {
    pub origin_city: String,
    pub origin_country: String,
    pub destination_city: String,
    pub destination_country: String,
    pub departure_date: NaiveDate,
    #[serde(default)]
    pub arrival_date: Option<NaiveDate>,
    pub capacity_kg: Decimal,
    pub price_per_kg: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTrip {
    pub departure_date: Option<NaiveDate>,
    pub arrival_date: Option<NaiveDate>,
    pub price_per_kg: Option<Decimal>,
    pub notes: Option<String>,
}

/// Owner-facing view counters for a trip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripStats {
    pub trip_id: Uuid,
    pub views: i64,
    pub unique_viewers: usize,
    pub capacity_kg: Decimal,
    pub reserved_kg: Decimal,
    pub committed_matches: i64,
}

pub struct TripService {
    trip_repo: Arc<TripRepository>,
    match_repo: Arc<MatchRepository>,
    user_repo: Arc<UserRepository>,
    cache: CacheService,
    ws_server: Arc<WebSocketServer>,
    pool: PgPool,
}

fn validate_new_trip(request: &CreateTrip, today: NaiveDate) -> AppResult<()> {
    let fields = [
        ("origin_city", &request.origin_city),
        ("origin_country", &request.origin_country),
        ("destination_city", &request.destination_city),
        ("destination_country", &request.destination_country),
    ];
    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{} is required", name)));
        }
    }

    let same_place = request.origin_city.trim().eq_ignore_ascii_case(request.destination_city.trim())
        && request
            .origin_country
            .trim()
            .eq_ignore_ascii_case(request.destination_country.trim());
    if same_place {
        return Err(AppError::Validation(
            "Origin and destination must differ".to_string(),
        ));
    }
    if request.departure_date < today {
        return Err(AppError::Validation(
            "Departure date must not be in the past".to_string(),
        ));
    }
    validate_dates(request.departure_date, request.arrival_date)?;
    if request.capacity_kg <= Decimal::ZERO
        || request.capacity_kg > Decimal::from(MAX_TRIP_CAPACITY_KG)
    {
        return Err(AppError::Validation(format!(
            "Capacity must be above 0 and at most {} kg",
            MAX_TRIP_CAPACITY_KG
        )));
    }
    validate_rate(request.price_per_kg)?;
    Ok(())
}

fn validate_dates(departure: NaiveDate, arrival: Option<NaiveDate>) -> AppResult<()> {
    match arrival {
        Some(arrival) if arrival < departure => Err(AppError::Validation(
            "Arrival date must not be before departure".to_string(),
        )),
        _ => Ok(()),
    }
}

impl TripService {
    pub fn new(
        trip_repo: Arc<TripRepository>,
        match_repo: Arc<MatchRepository>,
        user_repo: Arc<UserRepository>,
        cache: CacheService,
        ws_server: Arc<WebSocketServer>,
        pool: PgPool,
    ) -> Self {
        Self {
            trip_repo,
            match_repo,
            user_repo,
            cache,
            ws_server,
            pool,
        }
    }

    pub async fn create(&self, traveler_id: Uuid, request: CreateTrip) -> AppResult<Trip> {
        let user = self
            .user_repo
            .find_by_id(traveler_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", traveler_id)))?;
        if !user.role_enum().can_travel() {
            return Err(AppError::Forbidden(
                "Only travelers can publish trips".to_string(),
            ));
        }

        validate_new_trip(&request, Utc::now().date_naive())?;

        let trip = self
            .trip_repo
            .create(&NewTrip {
                traveler_id,
                origin_city: request.origin_city.trim().to_string(),
                origin_country: request.origin_country.trim().to_uppercase(),
                destination_city: request.destination_city.trim().to_string(),
                destination_country: request.destination_country.trim().to_uppercase(),
                departure_date: request.departure_date,
                arrival_date: request.arrival_date,
                capacity_kg: request.capacity_kg,
                price_per_kg: request.price_per_kg,
                notes: request.notes,
            })
            .await?;

        info!(
            "Trip {} created: {} -> {} on {}",
            trip.id, trip.origin_country, trip.destination_country, trip.departure_date
        );
        self.invalidate(&trip).await;
        Ok(trip)
    }

    /// Trip details. Views by anyone but the owner are counted.
    pub async fn get(&self, trip_id: Uuid, viewer: Option<Uuid>) -> AppResult<Trip> {
        let trip = self.load(trip_id).await?;

        if viewer != Some(trip.traveler_id) {
            let views_key = CacheKeys::trip_views(trip_id);
            if self.cache.increment(&views_key, 1).await == 1 {
                self.cache.expire(&views_key, CacheTtl::Weekly.as_secs()).await;
            }
            if let Some(viewer) = viewer {
                let viewers_key = CacheKeys::trip_viewers(trip_id);
                if self.cache.s_add(&viewers_key, &[viewer.to_string()]).await > 0 {
                    self.cache.expire(&viewers_key, CacheTtl::Weekly.as_secs()).await;
                }
            }
        }

        Ok(trip)
    }

    async fn load(&self, trip_id: Uuid) -> AppResult<Trip> {
        let repo = self.trip_repo.clone();
        self.cache
            .get_or_set(&CacheKeys::trip(trip_id), CacheTtl::Medium, || async move {
                repo.find_by_id(trip_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Trip {} not found", trip_id)))
            })
            .await
    }

    /// Marketplace search, cached per normalized filter set
    pub async fn search(&self, search: TripSearch) -> AppResult<Vec<Trip>> {
        let search = search.normalized();
        let key = CacheKeys::trip_search(&search);
        let repo = self.trip_repo.clone();
        self.cache
            .get_or_set(&key, CacheTtl::Short, || async move {
                Ok::<_, AppError>(repo.search(&search).await?)
            })
            .await
    }

    pub async fn list_mine(&self, traveler_id: Uuid) -> AppResult<Vec<Trip>> {
        let repo = self.trip_repo.clone();
        self.cache
            .get_or_set(&CacheKeys::user_trips(traveler_id), CacheTtl::Short, || async move {
                Ok::<_, AppError>(repo.list_by_traveler(traveler_id).await?)
            })
            .await
    }

    pub async fn update(&self, traveler_id: Uuid, trip_id: Uuid, request: UpdateTrip) -> AppResult<Trip> {
        let trip = self.owned(traveler_id, trip_id).await?;

        let departure = request.departure_date.unwrap_or(trip.departure_date);
        if request.departure_date.is_some() && departure < Utc::now().date_naive() {
            return Err(AppError::Validation(
                "Departure date must not be in the past".to_string(),
            ));
        }
        validate_dates(departure, request.arrival_date.or(trip.arrival_date))?;
        if let Some(price) = request.price_per_kg {
            validate_rate(price)?;
        }

        let updated = self
            .trip_repo
            .update_details(
                trip_id,
                &TripChanges {
                    departure_date: request.departure_date,
                    arrival_date: request.arrival_date,
                    price_per_kg: request.price_per_kg,
                    notes: request.notes,
                },
            )
            .await?
            .ok_or_else(|| AppError::Conflict("Only open trips can be edited".to_string()))?;

        self.invalidate(&updated).await;
        Ok(updated)
    }

    /// Withdraw a trip. Pending requests are declined; accepted ones block it.
    pub async fn cancel(&self, traveler_id: Uuid, trip_id: Uuid) -> AppResult<Trip> {
        let trip = self.owned(traveler_id, trip_id).await?;
        if !trip.status_enum().is_open() {
            return Err(AppError::Conflict(format!(
                "Trip is already {}",
                trip.status
            )));
        }
        if self.match_repo.count_committed_for_trip(trip_id).await? > 0 {
            return Err(AppError::Conflict(
                "Trip has accepted matches and cannot be cancelled".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let cancelled = TripRepository::transition(
            &mut *tx,
            trip_id,
            &[TripStatus::Active, TripStatus::Full],
            TripStatus::Cancelled,
        )
        .await?
        .ok_or_else(|| AppError::Conflict("Trip status changed concurrently".to_string()))?;
        let declined =
            MatchRepository::cancel_pending_for_trip(&mut *tx, trip_id, "Trip cancelled by traveler")
                .await?;
        tx.commit().await?;

        for m in &declined {
            self.ws_server
                .broadcast_match_status(m, Some(MatchStatus::Pending.as_str()))
                .await;
            self.cache.delete(&CacheKeys::match_record(m.id)).await;
            self.cache.invalidate_users(&[m.sender_id, m.traveler_id]).await;
        }

        info!("Trip {} cancelled, {} pending requests declined", trip_id, declined.len());
        self.invalidate(&cancelled).await;
        Ok(cancelled)
    }

    pub async fn stats(&self, traveler_id: Uuid, trip_id: Uuid) -> AppResult<TripStats> {
        let trip = self.owned(traveler_id, trip_id).await?;
        let views = self
            .cache
            .get::<i64>(&CacheKeys::trip_views(trip_id))
            .await
            .unwrap_or(0);
        let unique_viewers = self
            .cache
            .s_members(&CacheKeys::trip_viewers(trip_id))
            .await
            .len();
        let committed_matches = self.match_repo.count_committed_for_trip(trip_id).await?;

        Ok(TripStats {
            trip_id,
            views,
            unique_viewers,
            capacity_kg: trip.capacity_kg,
            reserved_kg: trip.reserved_kg(),
            committed_matches,
        })
    }

    /// Load a trip fresh from the database and check ownership
    async fn owned(&self, traveler_id: Uuid, trip_id: Uuid) -> AppResult<Trip> {
        let trip = self
            .trip_repo
            .find_by_id(trip_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Trip {} not found", trip_id)))?;
        if trip.traveler_id != traveler_id {
            return Err(AppError::Forbidden("Trip belongs to another traveler".to_string()));
        }
        Ok(trip)
    }

    async fn invalidate(&self, trip: &Trip) {
        self.cache.delete(&CacheKeys::trip(trip.id)).await;
        self.cache.delete_pattern(CacheKeys::all_trip_searches()).await;
        self.cache.invalidate_users(&[trip.traveler_id]).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateTrip {
        CreateTrip {
            origin_city: "Lagos".to_string(),
            origin_country: "NG".to_string(),
            destination_city: "London".to_string(),
            destination_country: "GB".to_string(),
            departure_date: NaiveDate::from_ymd_opt(2030, 5, 1).unwrap(),
            arrival_date: Some(NaiveDate::from_ymd_opt(2030, 5, 2).unwrap()),
            capacity_kg: Decimal::new(20, 0),
            price_per_kg: Decimal::new(1000, 2),
            notes: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()
    }

    #[test]
    fn test_valid_trip() {
        assert!(validate_new_trip(&request(), today()).is_ok());
    }

    #[test]
    fn test_trip_rules() {
        let mut r = request();
        r.departure_date = NaiveDate::from_ymd_opt(2029, 12, 31).unwrap();
        r.arrival_date = None;
        assert!(validate_new_trip(&r, today()).is_err());

        let mut r = request();
        r.arrival_date = Some(NaiveDate::from_ymd_opt(2030, 4, 30).unwrap());
        assert!(validate_new_trip(&r, today()).is_err());

        let mut r = request();
        r.capacity_kg = Decimal::ZERO;
        assert!(validate_new_trip(&r, today()).is_err());

        let mut r = request();
        r.capacity_kg = Decimal::new(101, 0);
        assert!(validate_new_trip(&r, today()).is_err());

        let mut r = request();
        r.destination_city = "lagos".to_string();
        r.destination_country = "ng".to_string();
        assert!(validate_new_trip(&r, today()).is_err());

        let mut r = request();
        r.origin_city = "  ".to_string();
        assert!(validate_new_trip(&r, today()).is_err());

        let mut r = request();
        r.price_per_kg = Decimal::MAX;
        assert!(validate_new_trip(&r, today()).is_err());
    }
}

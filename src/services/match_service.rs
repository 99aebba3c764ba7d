use crate::cache::{CacheKeys, CacheService, CacheTtl};
use crate::error::{AppError, AppResult};
use crate::models::{EscrowRecord, Match, MatchStatus, Parcel, ParcelStatus, Trip};
use crate::pricing::{round_money, PriceEstimator, PriceQuery};
use crate::repositories::{MatchRepository, NewMatch, ParcelRepository, TripRepository};
use crate::services::audit::AuditTrailService;
use crate::services::escrow_service::EscrowService;
use crate::websocket::WebSocketServer;
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Match requests a user may send per window
pub const MAX_MATCH_REQUESTS: i64 = 20;
pub const MATCH_REQUEST_WINDOW_SECS: u64 = 3600;

/// Ceiling on a negotiated delivery price
pub const MAX_AGREED_PRICE: Decimal = Decimal::from_parts(100_000, 0, 0, false, 0);

#[derive(Debug, Clone, Deserialize)]
pub struct RequestMatch {
    pub trip_id: Uuid,
    pub parcel_id: Uuid,
    /// Defaults to the estimate at the trip's rate
    #[serde(default)]
    pub agreed_price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayMatch {
    pub payment_reference: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelMatch {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Reject a move the status table does not allow
pub fn ensure_transition(current: MatchStatus, next: MatchStatus) -> AppResult<()> {
    if current.can_transition_to(next) {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "Match cannot move from {} to {}",
            current.as_str(),
            next.as_str()
        )))
    }
}

/// Listing checks that apply before any request is stored
fn check_pairing(requester: Uuid, trip: &Trip, parcel: &Parcel) -> AppResult<()> {
    if requester != parcel.sender_id && requester != trip.traveler_id {
        return Err(AppError::Forbidden(
            "Only the parcel sender or the trip traveler can request this match".to_string(),
        ));
    }
    if parcel.sender_id == trip.traveler_id {
        return Err(AppError::Validation(
            "A parcel cannot be matched with its sender's own trip".to_string(),
        ));
    }
    if !parcel.is_open() {
        return Err(AppError::Conflict(format!("Parcel is {}", parcel.status)));
    }
    if !trip.is_active() {
        return Err(AppError::Conflict(format!("Trip is {}", trip.status)));
    }
    if !trip.serves_route(&parcel.origin_country, &parcel.destination_country) {
        return Err(AppError::BusinessLogic(format!(
            "Trip goes {} -> {}, parcel needs {} -> {}",
            trip.origin_country, trip.destination_country, parcel.origin_country, parcel.destination_country
        )));
    }
    if parcel.weight_kg > trip.remaining_kg {
        return Err(AppError::BusinessLogic(format!(
            "Parcel weighs {} kg, trip has {} kg left",
            parcel.weight_kg, trip.remaining_kg
        )));
    }
    if !parcel.deadline_allows(trip.departure_date) {
        return Err(AppError::BusinessLogic(
            "Trip departs after the parcel's delivery deadline".to_string(),
        ));
    }
    Ok(())
}

pub struct MatchService {
    match_repo: Arc<MatchRepository>,
    trip_repo: Arc<TripRepository>,
    parcel_repo: Arc<ParcelRepository>,
    escrow: Arc<EscrowService>,
    estimator: Arc<PriceEstimator>,
    cache: CacheService,
    ws_server: Arc<WebSocketServer>,
    audit: Arc<AuditTrailService>,
    pool: PgPool,
}

impl MatchService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        match_repo: Arc<MatchRepository>,
        trip_repo: Arc<TripRepository>,
        parcel_repo: Arc<ParcelRepository>,
        escrow: Arc<EscrowService>,
        estimator: Arc<PriceEstimator>,
        cache: CacheService,
        ws_server: Arc<WebSocketServer>,
        audit: Arc<AuditTrailService>,
        pool: PgPool,
    ) -> Self {
        Self {
            match_repo,
            trip_repo,
            parcel_repo,
            escrow,
            estimator,
            cache,
            ws_server,
            audit,
            pool,
        }
    }

    /// Propose a trip/parcel pairing. Either side may ask; the other answers.
    pub async fn request(&self, user_id: Uuid, request: RequestMatch) -> AppResult<Match> {
        self.check_rate_limit(user_id).await?;

        let trip = self.trip(request.trip_id).await?;
        let parcel = self.parcel(request.parcel_id).await?;
        check_pairing(user_id, &trip, &parcel)?;

        if self
            .match_repo
            .pending_exists(trip.id, parcel.id)
            .await?
        {
            return Err(AppError::Conflict(
                "A request for this trip and parcel is already pending".to_string(),
            ));
        }

        let agreed_price = match request.agreed_price {
            Some(price) if price <= Decimal::ZERO => {
                return Err(AppError::Validation("Agreed price must be positive".to_string()))
            }
            Some(price) if price > MAX_AGREED_PRICE => {
                return Err(AppError::Validation(format!(
                    "Agreed price must not exceed {}",
                    MAX_AGREED_PRICE
                )))
            }
            Some(price) => round_money(price),
            None => {
                self.estimator
                    .estimate(&PriceQuery {
                        weight_kg: parcel.weight_kg,
                        distance_km: None,
                        origin_country: parcel.origin_country.clone(),
                        destination_country: parcel.destination_country.clone(),
                        rate_per_kg: Some(trip.price_per_kg),
                    })?
                    .subtotal
            }
        };

        let platform_fee = self.estimator.platform_fee(agreed_price)?;

        let created = self
            .match_repo
            .create(&NewMatch {
                trip_id: trip.id,
                parcel_id: parcel.id,
                sender_id: parcel.sender_id,
                traveler_id: trip.traveler_id,
                requested_by: user_id,
                agreed_price,
                platform_fee,
            })
            .await?;

        info!(
            "Match {} requested by {} for trip {} and parcel {} at {}",
            created.id, user_id, trip.id, parcel.id, agreed_price
        );
        self.notify(&created, None, user_id).await;
        Ok(created)
    }

    /// Counterparty accepts: capacity is reserved and rival requests are declined
    pub async fn accept(&self, user_id: Uuid, match_id: Uuid) -> AppResult<Match> {
        let current = self.fresh(match_id).await?;
        if user_id != current.counterparty_of_requester() {
            return Err(AppError::Forbidden(
                "Only the other party can accept this request".to_string(),
            ));
        }
        let parcel = self.parcel(current.parcel_id).await?;

        let mut tx = self.pool.begin().await?;
        let locked = MatchRepository::find_for_update(&mut *tx, match_id).await?;
        ensure_transition(locked.status_enum(), MatchStatus::Accepted)?;

        TripRepository::reserve_capacity(&mut *tx, locked.trip_id, parcel.weight_kg)
            .await?
            .ok_or_else(|| {
                AppError::BusinessLogic("Trip no longer has room for this parcel".to_string())
            })?;
        ParcelRepository::transition(&mut *tx, parcel.id, &[ParcelStatus::Open], ParcelStatus::Matched)
            .await?
            .ok_or_else(|| AppError::Conflict("Parcel is no longer open".to_string()))?;
        let accepted = Self::move_to(&mut *tx, &locked, MatchStatus::Accepted, None).await?;
        let declined =
            MatchRepository::cancel_competing_requests(&mut *tx, parcel.id, match_id).await?;
        tx.commit().await?;

        self.notify(&accepted, Some(MatchStatus::Pending), user_id).await;
        for other in &declined {
            self.notify(other, Some(MatchStatus::Pending), user_id).await;
        }
        Ok(accepted)
    }

    /// Sender pays; the total goes into escrow
    pub async fn pay(&self, user_id: Uuid, match_id: Uuid, payment: PayMatch) -> AppResult<Match> {
        let reference = payment.payment_reference.trim();
        if reference.is_empty() || reference.len() > 128 {
            return Err(AppError::Validation(
                "Payment reference must be between 1 and 128 characters".to_string(),
            ));
        }
        let current = self.fresh(match_id).await?;
        if user_id != current.sender_id {
            return Err(AppError::Forbidden("Only the sender pays for a match".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        let locked = MatchRepository::find_for_update(&mut *tx, match_id).await?;
        let paid = Self::move_to(&mut *tx, &locked, MatchStatus::Paid, None).await?;
        let escrow = self.escrow.hold(&mut *tx, &paid, reference).await?;
        tx.commit().await?;

        info!("Match {} paid, {} held in escrow", match_id, escrow.amount);
        self.notify(&paid, Some(MatchStatus::Accepted), user_id).await;
        self.escrow.notify("escrow_held", &escrow, Some(user_id)).await;
        Ok(paid)
    }

    /// Traveler has the parcel in hand
    pub async fn confirm_pickup(&self, user_id: Uuid, match_id: Uuid) -> AppResult<Match> {
        self.traveler_step(user_id, match_id, MatchStatus::Confirmed, None)
            .await
    }

    pub async fn start_transit(&self, user_id: Uuid, match_id: Uuid) -> AppResult<Match> {
        self.traveler_step(
            user_id,
            match_id,
            MatchStatus::InTransit,
            Some((ParcelStatus::Matched, ParcelStatus::InTransit)),
        )
        .await
    }

    /// Traveler reports delivery; the sender's confirmation window opens
    pub async fn deliver(&self, user_id: Uuid, match_id: Uuid) -> AppResult<Match> {
        let current = self.fresh(match_id).await?;
        if user_id != current.traveler_id {
            return Err(AppError::Forbidden(
                "Only the traveler can mark a match delivered".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let locked = MatchRepository::find_for_update(&mut *tx, match_id).await?;
        let delivered = Self::move_to(&mut *tx, &locked, MatchStatus::Delivered, None).await?;
        ParcelRepository::transition(
            &mut *tx,
            locked.parcel_id,
            &[ParcelStatus::InTransit],
            ParcelStatus::Delivered,
        )
        .await?
        .ok_or_else(|| AppError::Conflict("Parcel is not in transit".to_string()))?;
        let escrow = EscrowService::lock_for_match(&mut *tx, match_id).await?;
        let scheduled = self.escrow.schedule_release(&mut *tx, &escrow).await?;
        tx.commit().await?;

        info!(
            "Match {} delivered, escrow auto-release at {:?}",
            match_id, scheduled.auto_release_at
        );
        self.notify(&delivered, Some(MatchStatus::InTransit), user_id).await;
        self.escrow
            .notify("escrow_release_scheduled", &scheduled, Some(user_id))
            .await;
        Ok(delivered)
    }

    /// Sender confirms receipt; the traveler is paid right away
    pub async fn confirm_delivery(&self, user_id: Uuid, match_id: Uuid) -> AppResult<EscrowRecord> {
        let current = self.fresh(match_id).await?;
        if user_id != current.sender_id {
            return Err(AppError::Forbidden(
                "Only the sender can confirm delivery".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let locked = MatchRepository::find_for_update(&mut *tx, match_id).await?;
        if locked.status_enum() != MatchStatus::Delivered {
            return Err(AppError::Conflict(format!(
                "Match is {}, not delivered",
                locked.status
            )));
        }
        let escrow = EscrowService::lock_for_match(&mut *tx, match_id).await?;
        let released = self.escrow.release(&mut *tx, &escrow).await?;
        tx.commit().await?;

        info!("Delivery of match {} confirmed, escrow released", match_id);
        self.cache.delete(&CacheKeys::match_record(match_id)).await;
        self.escrow.notify("escrow_released", &released, Some(user_id)).await;
        Ok(released)
    }

    /// Either party backs out. Reserved capacity is returned and paid
    /// escrow is refunded. Disputed matches are settled by an admin instead.
    pub async fn cancel(&self, user_id: Uuid, match_id: Uuid, request: CancelMatch) -> AppResult<Match> {
        let current = self.fresh(match_id).await?;
        if !current.is_party(user_id) {
            return Err(AppError::Forbidden("Not a party to this match".to_string()));
        }
        let parcel = self.parcel(current.parcel_id).await?;
        let reason = request
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or("Cancelled by participant")
            .to_string();

        let mut tx = self.pool.begin().await?;
        let locked = MatchRepository::find_for_update(&mut *tx, match_id).await?;
        let previous = locked.status_enum();
        if previous == MatchStatus::Disputed {
            return Err(AppError::Conflict(
                "Match is under dispute and can only be settled by the dispute".to_string(),
            ));
        }
        ensure_transition(previous, MatchStatus::Cancelled)?;

        if previous.holds_capacity() {
            TripRepository::release_capacity(&mut *tx, locked.trip_id, parcel.weight_kg).await?;
            ParcelRepository::transition(&mut *tx, parcel.id, &[ParcelStatus::Matched], ParcelStatus::Open)
                .await?;
        }
        let refunded = if previous.has_escrow() {
            let escrow = EscrowService::lock_for_match(&mut *tx, match_id).await?;
            Some(self.escrow.refund(&mut *tx, &escrow).await?)
        } else {
            None
        };
        let cancelled = Self::move_to(&mut *tx, &locked, MatchStatus::Cancelled, Some(&reason)).await?;
        tx.commit().await?;

        info!("Match {} cancelled by {} from {}", match_id, user_id, previous.as_str());
        self.notify(&cancelled, Some(previous), user_id).await;
        if let Some(escrow) = refunded {
            self.escrow.notify("escrow_refunded", &escrow, Some(user_id)).await;
        }
        Ok(cancelled)
    }

    pub async fn get(&self, user_id: Uuid, match_id: Uuid) -> AppResult<Match> {
        let repo = self.match_repo.clone();
        let found = self
            .cache
            .get_or_set(&CacheKeys::match_record(match_id), CacheTtl::Medium, || async move {
                repo.find_by_id(match_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Match {} not found", match_id)))
            })
            .await?;

        if !found.is_party(user_id) {
            return Err(AppError::Forbidden("Not a party to this match".to_string()));
        }
        Ok(found)
    }

    pub async fn list(&self, user_id: Uuid, status: Option<MatchStatus>) -> AppResult<Vec<Match>> {
        if status.is_some() {
            return Ok(self.match_repo.list_for_user(user_id, status).await?);
        }
        let repo = self.match_repo.clone();
        self.cache
            .get_or_set(&CacheKeys::user_matches(user_id), CacheTtl::Short, || async move {
                Ok::<_, AppError>(repo.list_for_user(user_id, None).await?)
            })
            .await
    }

    pub async fn escrow(&self, user_id: Uuid, match_id: Uuid) -> AppResult<EscrowRecord> {
        self.escrow.get_for_match(user_id, match_id).await
    }

    async fn traveler_step(
        &self,
        user_id: Uuid,
        match_id: Uuid,
        next: MatchStatus,
        parcel_move: Option<(ParcelStatus, ParcelStatus)>,
    ) -> AppResult<Match> {
        let current = self.fresh(match_id).await?;
        if user_id != current.traveler_id {
            return Err(AppError::Forbidden(format!(
                "Only the traveler can mark a match {}",
                next.as_str()
            )));
        }

        let mut tx = self.pool.begin().await?;
        let locked = MatchRepository::find_for_update(&mut *tx, match_id).await?;
        let previous = locked.status_enum();
        let updated = Self::move_to(&mut *tx, &locked, next, None).await?;
        if let Some((from, to)) = parcel_move {
            ParcelRepository::transition(&mut *tx, locked.parcel_id, &[from], to)
                .await?
                .ok_or_else(|| {
                    AppError::Conflict(format!("Parcel is not {}", from.as_str()))
                })?;
        }
        tx.commit().await?;

        self.notify(&updated, Some(previous), user_id).await;
        Ok(updated)
    }

    /// Checked status change on a locked row
    pub(crate) async fn move_to(
        conn: &mut PgConnection,
        locked: &Match,
        next: MatchStatus,
        reason: Option<&str>,
    ) -> AppResult<Match> {
        let current = locked.status_enum();
        ensure_transition(current, next)?;
        MatchRepository::transition(&mut *conn, locked.id, current, next, reason)
            .await?
            .ok_or_else(|| AppError::Conflict("Match status changed concurrently".to_string()))
    }

    async fn check_rate_limit(&self, user_id: Uuid) -> AppResult<()> {
        let key = CacheKeys::rate_limit(user_id, "match_request");
        let count = self.cache.increment(&key, 1).await;
        if count == 1 {
            self.cache.expire(&key, MATCH_REQUEST_WINDOW_SECS).await;
        }
        // 0 means the cache is unavailable; requests are not limited then
        if count > MAX_MATCH_REQUESTS {
            debug!("User {} hit the match request limit ({})", user_id, count);
            return Err(AppError::RateLimited(format!(
                "At most {} match requests per hour",
                MAX_MATCH_REQUESTS
            )));
        }
        Ok(())
    }

    async fn fresh(&self, match_id: Uuid) -> AppResult<Match> {
        self.match_repo
            .find_by_id(match_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Match {} not found", match_id)))
    }

    async fn trip(&self, trip_id: Uuid) -> AppResult<Trip> {
        self.trip_repo
            .find_by_id(trip_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Trip {} not found", trip_id)))
    }

    async fn parcel(&self, parcel_id: Uuid) -> AppResult<Parcel> {
        self.parcel_repo
            .find_by_id(parcel_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Parcel {} not found", parcel_id)))
    }

    /// Broadcast, audit and invalidate after a committed status change
    async fn notify(&self, updated: &Match, previous: Option<MatchStatus>, actor_id: Uuid) {
        let previous = previous.map(|s| s.as_str());
        self.ws_server.broadcast_match_status(updated, previous).await;
        self.audit
            .log_match_status(updated, previous.unwrap_or("none"), Some(actor_id))
            .await;
        invalidate_match(&self.cache, updated).await;
    }
}

/// Drop every cached view a match status change can affect
pub(crate) async fn invalidate_match(cache: &CacheService, updated: &Match) {
    cache
        .delete_many(&[
            CacheKeys::match_record(updated.id),
            CacheKeys::trip(updated.trip_id),
            CacheKeys::parcel(updated.parcel_id),
        ])
        .await;
    cache.delete_pattern(CacheKeys::all_trip_searches()).await;
    cache.delete_pattern(CacheKeys::all_parcel_searches()).await;
    cache
        .invalidate_users(&[updated.sender_id, updated.traveler_id])
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn trip(traveler_id: Uuid) -> Trip {
        let now = Utc::now().naive_utc();
        Trip {
            id: Uuid::new_v4(),
            traveler_id,
            origin_city: "Lagos".to_string(),
            origin_country: "NG".to_string(),
            destination_city: "London".to_string(),
            destination_country: "GB".to_string(),
            departure_date: NaiveDate::from_ymd_opt(2030, 5, 1).unwrap(),
            arrival_date: None,
            capacity_kg: Decimal::new(20, 0),
            remaining_kg: Decimal::new(5, 0),
            price_per_kg: Decimal::new(10, 0),
            status: "active".to_string(),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn parcel(sender_id: Uuid) -> Parcel {
        let now = Utc::now().naive_utc();
        Parcel {
            id: Uuid::new_v4(),
            sender_id,
            title: "Books".to_string(),
            description: None,
            weight_kg: Decimal::new(3, 0),
            declared_value: Decimal::new(50, 0),
            category: "documents".to_string(),
            origin_city: "Lagos".to_string(),
            origin_country: "NG".to_string(),
            destination_city: "Manchester".to_string(),
            destination_country: "GB".to_string(),
            deliver_by: None,
            offered_reward: Decimal::new(30, 0),
            status: "open".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_ensure_transition() {
        assert!(ensure_transition(MatchStatus::Pending, MatchStatus::Accepted).is_ok());
        assert!(ensure_transition(MatchStatus::InTransit, MatchStatus::Delivered).is_ok());
        assert!(matches!(
            ensure_transition(MatchStatus::Pending, MatchStatus::Paid),
            Err(AppError::Conflict(_))
        ));
        assert!(ensure_transition(MatchStatus::Cancelled, MatchStatus::Pending).is_err());
    }

    #[test]
    fn test_pairing_accepts_either_party() {
        let traveler = Uuid::new_v4();
        let sender = Uuid::new_v4();
        let t = trip(traveler);
        let p = parcel(sender);

        assert!(check_pairing(sender, &t, &p).is_ok());
        assert!(check_pairing(traveler, &t, &p).is_ok());
        assert!(matches!(
            check_pairing(Uuid::new_v4(), &t, &p),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_pairing_rules() {
        let traveler = Uuid::new_v4();
        let sender = Uuid::new_v4();

        let own = parcel(traveler);
        assert!(check_pairing(traveler, &trip(traveler), &own).is_err());

        let mut heavy = parcel(sender);
        heavy.weight_kg = Decimal::new(6, 0);
        assert!(matches!(
            check_pairing(sender, &trip(traveler), &heavy),
            Err(AppError::BusinessLogic(_))
        ));

        let mut elsewhere = parcel(sender);
        elsewhere.destination_country = "FR".to_string();
        assert!(check_pairing(sender, &trip(traveler), &elsewhere).is_err());

        let mut urgent = parcel(sender);
        urgent.deliver_by = NaiveDate::from_ymd_opt(2030, 4, 30);
        assert!(check_pairing(sender, &trip(traveler), &urgent).is_err());

        let mut full = trip(traveler);
        full.status = "full".to_string();
        assert!(matches!(
            check_pairing(sender, &full, &parcel(sender)),
            Err(AppError::Conflict(_))
        ));

        let mut matched = parcel(sender);
        matched.status = "matched".to_string();
        assert!(check_pairing(sender, &trip(traveler), &matched).is_err());
    }
}

use crate::cache::CacheService;
use crate::error::{AppError, AppResult};
use crate::models::{
    Dispute, DisputeReason, DisputeResolution, DisputeStatus, EscrowRecord, Match, MatchStatus,
    ParcelStatus,
};
use crate::repositories::{
    DisputeRepository, MatchRepository, ParcelRepository, TripRepository,
};
use crate::services::audit::AuditTrailService;
use crate::services::escrow_service::EscrowService;
use crate::services::match_service::{invalidate_match, MatchService};
use crate::websocket::WebSocketServer;
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const MAX_DESCRIPTION_CHARS: usize = 2000;

#[derive(Debug, Clone, Deserialize)]
pub struct OpenDispute {
    pub reason: DisputeReason,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveDispute {
    pub resolution: DisputeResolution,
    #[serde(default)]
    pub note: Option<String>,
}

/// Everything a dispute step changed, for notification after commit
struct Outcome {
    dispute: Dispute,
    updated_match: Option<(Match, MatchStatus)>,
    escrow: Option<(&'static str, EscrowRecord)>,
}

pub struct DisputeService {
    dispute_repo: Arc<DisputeRepository>,
    match_repo: Arc<MatchRepository>,
    escrow: Arc<EscrowService>,
    cache: CacheService,
    ws_server: Arc<WebSocketServer>,
    audit: Arc<AuditTrailService>,
    pool: PgPool,
}

impl DisputeService {
    pub fn new(
        dispute_repo: Arc<DisputeRepository>,
        match_repo: Arc<MatchRepository>,
        escrow: Arc<EscrowService>,
        cache: CacheService,
        ws_server: Arc<WebSocketServer>,
        audit: Arc<AuditTrailService>,
        pool: PgPool,
    ) -> Self {
        Self {
            dispute_repo,
            match_repo,
            escrow,
            cache,
            ws_server,
            audit,
            pool,
        }
    }

    /// A party freezes the escrow of a paid match
    pub async fn open(&self, user_id: Uuid, match_id: Uuid, request: OpenDispute) -> AppResult<Dispute> {
        let description = request.description.trim();
        if description.is_empty() || description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(AppError::Validation(format!(
                "Description must be between 1 and {} characters",
                MAX_DESCRIPTION_CHARS
            )));
        }

        let current = self
            .match_repo
            .find_by_id(match_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Match {} not found", match_id)))?;
        if !current.is_party(user_id) {
            return Err(AppError::Forbidden("Not a party to this match".to_string()));
        }
        if self.dispute_repo.find_open_for_match(match_id).await?.is_some() {
            return Err(AppError::Conflict(
                "This match already has an open dispute".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let locked = MatchRepository::find_for_update(&mut *tx, match_id).await?;
        let previous = locked.status_enum();
        if !previous.is_disputable() {
            return Err(AppError::Conflict(format!(
                "A {} match cannot be disputed",
                previous.as_str()
            )));
        }
        let escrow = EscrowService::lock_for_match(&mut *tx, match_id).await?;
        if !escrow.is_held() {
            return Err(AppError::Conflict(format!(
                "Escrow is already {}",
                escrow.status
            )));
        }

        let dispute = DisputeRepository::create(
            &mut *tx,
            match_id,
            user_id,
            request.reason,
            description,
            previous,
        )
        .await?;
        let disputed = MatchService::move_to(&mut *tx, &locked, MatchStatus::Disputed, None).await?;
        let frozen = self.escrow.mark_disputed(&mut *tx, &escrow).await?;
        tx.commit().await?;

        info!(
            "Dispute {} opened on match {} by {} ({})",
            dispute.id,
            match_id,
            user_id,
            request.reason.as_str()
        );
        self.notify(
            Outcome {
                dispute: dispute.clone(),
                updated_match: Some((disputed, previous)),
                escrow: Some(("escrow_disputed", frozen)),
            },
            user_id,
        )
        .await;
        Ok(dispute)
    }

    /// Admin picks up an open dispute
    pub async fn start_review(&self, admin_id: Uuid, dispute_id: Uuid) -> AppResult<Dispute> {
        let mut tx = self.pool.begin().await?;
        let reviewed = DisputeRepository::transition(
            &mut *tx,
            dispute_id,
            &[DisputeStatus::Open],
            DisputeStatus::UnderReview,
            None,
            None,
        )
        .await?
        .ok_or_else(|| AppError::Conflict("Only open disputes can be reviewed".to_string()))?;
        tx.commit().await?;

        self.notify(
            Outcome {
                dispute: reviewed.clone(),
                updated_match: None,
                escrow: None,
            },
            admin_id,
        )
        .await;
        Ok(reviewed)
    }

    /// Admin decision. Refunding cancels the match and the parcel; releasing
    /// treats the parcel as delivered.
    pub async fn resolve(
        &self,
        admin_id: Uuid,
        dispute_id: Uuid,
        request: ResolveDispute,
    ) -> AppResult<Dispute> {
        let note = request.note.as_deref().map(str::trim).filter(|n| !n.is_empty());

        let mut tx = self.pool.begin().await?;
        let dispute = DisputeRepository::find_for_update(&mut *tx, dispute_id).await?;
        if !dispute.is_open() {
            return Err(AppError::Conflict(format!("Dispute is {}", dispute.status)));
        }
        let locked = MatchRepository::find_for_update(&mut *tx, dispute.match_id).await?;
        let escrow = EscrowService::lock_for_match(&mut *tx, dispute.match_id).await?;
        let unsettled = [ParcelStatus::Matched, ParcelStatus::InTransit, ParcelStatus::Delivered];

        let (updated_match, settled) = match request.resolution {
            DisputeResolution::RefundSender => {
                let refunded = self.escrow.refund(&mut *tx, &escrow).await?;
                let cancelled = MatchService::move_to(
                    &mut *tx,
                    &locked,
                    MatchStatus::Cancelled,
                    Some("Dispute resolved with a refund to the sender"),
                )
                .await?;
                let parcel =
                    ParcelRepository::transition(&mut *tx, locked.parcel_id, &unsettled, ParcelStatus::Cancelled)
                        .await?;
                if let Some(parcel) = parcel {
                    TripRepository::release_capacity(&mut *tx, locked.trip_id, parcel.weight_kg).await?;
                }
                (cancelled, ("escrow_refunded", refunded))
            }
            DisputeResolution::ReleaseToTraveler => {
                let released = self.escrow.release(&mut *tx, &escrow).await?;
                let delivered =
                    MatchService::move_to(&mut *tx, &locked, MatchStatus::Delivered, None).await?;
                ParcelRepository::transition(&mut *tx, locked.parcel_id, &unsettled, ParcelStatus::Delivered)
                    .await?;
                (delivered, ("escrow_released", released))
            }
        };

        let resolved = DisputeRepository::transition(
            &mut *tx,
            dispute_id,
            &[DisputeStatus::Open, DisputeStatus::UnderReview],
            DisputeStatus::Resolved,
            Some(request.resolution),
            note,
        )
        .await?
        .ok_or_else(|| AppError::Conflict("Dispute status changed concurrently".to_string()))?;
        tx.commit().await?;

        info!(
            "Dispute {} resolved by {}: {}",
            dispute_id,
            admin_id,
            request.resolution.as_str()
        );
        self.notify(
            Outcome {
                dispute: resolved.clone(),
                updated_match: Some((updated_match, MatchStatus::Disputed)),
                escrow: Some(settled),
            },
            admin_id,
        )
        .await;
        Ok(resolved)
    }

    /// The opener drops the dispute; match and escrow go back to where they were
    pub async fn withdraw(&self, user_id: Uuid, dispute_id: Uuid) -> AppResult<Dispute> {
        let mut tx = self.pool.begin().await?;
        let dispute = DisputeRepository::find_for_update(&mut *tx, dispute_id).await?;
        if dispute.opened_by != user_id {
            return Err(AppError::Forbidden(
                "Only the user who opened a dispute can withdraw it".to_string(),
            ));
        }
        if !dispute.is_open() {
            return Err(AppError::Conflict(format!("Dispute is {}", dispute.status)));
        }

        let restore_to = MatchStatus::from_str(&dispute.previous_match_status)
            .map_err(AppError::Message)?;
        let locked = MatchRepository::find_for_update(&mut *tx, dispute.match_id).await?;
        let restored = MatchService::move_to(&mut *tx, &locked, restore_to, None).await?;
        let escrow = EscrowService::lock_for_match(&mut *tx, dispute.match_id).await?;
        let held = self.escrow.restore_held(&mut *tx, &escrow).await?;

        let withdrawn = DisputeRepository::transition(
            &mut *tx,
            dispute_id,
            &[DisputeStatus::Open, DisputeStatus::UnderReview],
            DisputeStatus::Withdrawn,
            None,
            None,
        )
        .await?
        .ok_or_else(|| AppError::Conflict("Dispute status changed concurrently".to_string()))?;
        tx.commit().await?;

        info!("Dispute {} withdrawn, match back to {}", dispute_id, restore_to.as_str());
        self.notify(
            Outcome {
                dispute: withdrawn.clone(),
                updated_match: Some((restored, MatchStatus::Disputed)),
                escrow: Some(("escrow_restored", held)),
            },
            user_id,
        )
        .await;
        Ok(withdrawn)
    }

    pub async fn get(&self, user_id: Uuid, dispute_id: Uuid) -> AppResult<Dispute> {
        let dispute = self
            .dispute_repo
            .find_by_id(dispute_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Dispute {} not found", dispute_id)))?;
        let disputed = self
            .match_repo
            .find_by_id(dispute.match_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Match {} not found", dispute.match_id)))?;
        if !disputed.is_party(user_id) {
            return Err(AppError::Forbidden("Not a party to this dispute".to_string()));
        }
        Ok(dispute)
    }

    pub async fn list(&self, user_id: Uuid) -> AppResult<Vec<Dispute>> {
        Ok(self.dispute_repo.list_for_user(user_id).await?)
    }

    async fn notify(&self, outcome: Outcome, actor_id: Uuid) {
        let parties = match &outcome.updated_match {
            Some((m, _)) => Some([m.sender_id, m.traveler_id]),
            None => self
                .match_repo
                .find_by_id(outcome.dispute.match_id)
                .await
                .ok()
                .flatten()
                .map(|m| [m.sender_id, m.traveler_id]),
        };

        if let Some(parties) = parties {
            self.ws_server
                .broadcast_dispute_updated(&outcome.dispute, parties)
                .await;
            self.cache.invalidate_users(&parties).await;
        }
        self.audit.log_dispute(&outcome.dispute, actor_id).await;

        if let Some((updated, previous)) = &outcome.updated_match {
            self.ws_server
                .broadcast_match_status(updated, Some(previous.as_str()))
                .await;
            self.audit
                .log_match_status(updated, previous.as_str(), Some(actor_id))
                .await;
            invalidate_match(&self.cache, updated).await;
        }
        if let Some((event_type, escrow)) = &outcome.escrow {
            self.escrow.notify(event_type, escrow, Some(actor_id)).await;
        }
    }
}

//! Escrow holds the sender's payment for a match until delivery is settled.
//!
//! Money-moving steps take a `&mut PgConnection` so callers can run them in
//! the same transaction as the match and parcel updates they belong to.
//! Notification (WebSocket, audit, cache) happens separately through
//! [`EscrowService::notify`] once that transaction has committed.

use crate::cache::{CacheKeys, CacheService, CacheTtl};
use crate::config::EscrowConfig;
use crate::error::{AppError, AppResult};
use crate::models::{EscrowRecord, EscrowStatus, Match, MatchStatus, TransactionType};
use crate::repositories::{EscrowRepository, LedgerEntry, MatchRepository, NewEscrow, WalletRepository};
use crate::services::audit::AuditTrailService;
use crate::websocket::WebSocketServer;
use chrono::{NaiveDateTime, Utc};
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Escrows released per sweep
const RELEASE_BATCH: i64 = 100;

pub struct EscrowService {
    escrow_repo: Arc<EscrowRepository>,
    cache: CacheService,
    ws_server: Arc<WebSocketServer>,
    audit: Arc<AuditTrailService>,
    pool: PgPool,
    config: EscrowConfig,
}

impl EscrowService {
    pub fn new(
        escrow_repo: Arc<EscrowRepository>,
        cache: CacheService,
        ws_server: Arc<WebSocketServer>,
        audit: Arc<AuditTrailService>,
        pool: PgPool,
        config: EscrowConfig,
    ) -> Self {
        Self {
            escrow_repo,
            cache,
            ws_server,
            audit,
            pool,
            config,
        }
    }

    /// Hold the match total. The traveler's share shows up as pending earnings.
    pub async fn hold(
        &self,
        conn: &mut PgConnection,
        paid: &Match,
        payment_reference: &str,
    ) -> AppResult<EscrowRecord> {
        let escrow = EscrowRepository::create(
            &mut *conn,
            &NewEscrow {
                match_id: paid.id,
                sender_id: paid.sender_id,
                traveler_id: paid.traveler_id,
                amount: paid.total_price(),
                traveler_payout: paid.agreed_price,
                platform_fee: paid.platform_fee,
                payment_reference: payment_reference.to_string(),
            },
        )
        .await?;
        WalletRepository::add_pending(&mut *conn, paid.traveler_id, escrow.traveler_payout).await?;
        Ok(escrow)
    }

    /// Pay the traveler. The platform keeps the fee.
    pub async fn release(&self, conn: &mut PgConnection, escrow: &EscrowRecord) -> AppResult<EscrowRecord> {
        let released = self.move_status(conn, escrow, EscrowStatus::Released).await?;
        WalletRepository::settle_pending(
            &mut *conn,
            released.traveler_id,
            released.traveler_payout,
            &LedgerEntry {
                match_id: Some(released.match_id),
                description: Some("Escrow released for delivered parcel"),
                ..Default::default()
            },
        )
        .await?;
        Ok(released)
    }

    /// Return the full amount, fee included, to the sender's wallet
    pub async fn refund(&self, conn: &mut PgConnection, escrow: &EscrowRecord) -> AppResult<EscrowRecord> {
        let refunded = self.move_status(conn, escrow, EscrowStatus::Refunded).await?;
        WalletRepository::remove_pending(&mut *conn, refunded.traveler_id, refunded.traveler_payout)
            .await?;
        WalletRepository::credit(
            &mut *conn,
            refunded.sender_id,
            refunded.amount,
            TransactionType::Refund,
            &LedgerEntry {
                match_id: Some(refunded.match_id),
                description: Some("Escrow refunded"),
                ..Default::default()
            },
        )
        .await?;
        Ok(refunded)
    }

    pub async fn mark_disputed(&self, conn: &mut PgConnection, escrow: &EscrowRecord) -> AppResult<EscrowRecord> {
        self.move_status(conn, escrow, EscrowStatus::Disputed).await
    }

    pub async fn restore_held(&self, conn: &mut PgConnection, escrow: &EscrowRecord) -> AppResult<EscrowRecord> {
        self.move_status(conn, escrow, EscrowStatus::Held).await
    }

    /// Start the auto-release clock after the traveler reports delivery
    pub async fn schedule_release(
        &self,
        conn: &mut PgConnection,
        escrow: &EscrowRecord,
    ) -> AppResult<EscrowRecord> {
        let release_at = Utc::now().naive_utc() + self.config.auto_release_window();
        Ok(EscrowRepository::set_auto_release(&mut *conn, escrow.id, release_at).await?)
    }

    /// Locked escrow row for a match
    pub async fn lock_for_match(conn: &mut PgConnection, match_id: Uuid) -> AppResult<EscrowRecord> {
        EscrowRepository::find_by_match_for_update(&mut *conn, match_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No escrow for match {}", match_id)))
    }

    async fn move_status(
        &self,
        conn: &mut PgConnection,
        escrow: &EscrowRecord,
        next: EscrowStatus,
    ) -> AppResult<EscrowRecord> {
        let current = escrow.status_enum();
        if !current.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "Escrow cannot move from {} to {}",
                current.as_str(),
                next.as_str()
            )));
        }
        EscrowRepository::transition(&mut *conn, escrow.id, current, next)
            .await?
            .ok_or_else(|| AppError::Conflict("Escrow status changed concurrently".to_string()))
    }

    /// Escrow for a match, visible to its two parties
    pub async fn get_for_match(&self, user_id: Uuid, match_id: Uuid) -> AppResult<EscrowRecord> {
        let repo = self.escrow_repo.clone();
        let escrow = self
            .cache
            .get_or_set(&CacheKeys::escrow(match_id), CacheTtl::Short, || async move {
                repo.find_by_match(match_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("No escrow for match {}", match_id)))
            })
            .await?;

        if escrow.sender_id != user_id && escrow.traveler_id != user_id {
            return Err(AppError::Forbidden("Not a party to this match".to_string()));
        }
        Ok(escrow)
    }

    /// Broadcast, audit and drop cached copies after a committed change
    pub async fn notify(&self, event_type: &str, escrow: &EscrowRecord, actor_id: Option<Uuid>) {
        self.ws_server.broadcast_escrow_updated(escrow).await;
        self.audit.log_escrow(event_type, escrow, actor_id).await;
        self.cache.delete(&CacheKeys::escrow(escrow.match_id)).await;
        self.cache
            .invalidate_users(&[escrow.sender_id, escrow.traveler_id])
            .await;
    }

    /// Release every delivered match whose confirmation window has lapsed.
    /// Returns the number released.
    pub async fn release_due(&self, now: NaiveDateTime) -> AppResult<usize> {
        let due = self.escrow_repo.find_due_for_release(now, RELEASE_BATCH).await?;
        let mut released = 0;

        for candidate in due {
            match self.auto_release(candidate.match_id, now).await {
                Ok(Some(escrow)) => {
                    released += 1;
                    info!(
                        "Escrow {} auto-released for match {}",
                        escrow.id, escrow.match_id
                    );
                    self.notify("escrow_auto_released", &escrow, None).await;
                }
                Ok(None) => {}
                Err(e) => error!("Auto-release of escrow {} failed: {}", candidate.id, e),
            }
        }

        Ok(released)
    }

    async fn auto_release(&self, match_id: Uuid, now: NaiveDateTime) -> AppResult<Option<EscrowRecord>> {
        let mut tx = self.pool.begin().await?;
        let locked_match = MatchRepository::find_for_update(&mut *tx, match_id).await?;
        let escrow = Self::lock_for_match(&mut *tx, match_id).await?;

        // a dispute opened after the candidate query wins
        if locked_match.status_enum() != MatchStatus::Delivered || !escrow.is_due_for_release(now) {
            warn!("Escrow for match {} no longer due, skipping", match_id);
            return Ok(None);
        }

        let released = self.release(&mut *tx, &escrow).await?;
        tx.commit().await?;

        self.cache.delete(&CacheKeys::match_record(match_id)).await;
        Ok(Some(released))
    }
}

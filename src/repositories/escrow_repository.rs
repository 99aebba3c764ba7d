use crate::error::RepositoryError;
use crate::models::{EscrowRecord, EscrowStatus};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const ESCROW_COLUMNS: &str = "id, match_id, sender_id, traveler_id, amount, traveler_payout, \
    platform_fee, status, payment_reference, held_at, auto_release_at, released_at, refunded_at";

/// Fields for a new escrow hold
#[derive(Debug, Clone)]
pub struct NewEscrow {
    pub match_id: Uuid,
    pub sender_id: Uuid,
    pub traveler_id: Uuid,
    pub amount: Decimal,
    pub traveler_payout: Decimal,
    pub platform_fee: Decimal,
    pub payment_reference: String,
}

/// Repository for escrow records
pub struct EscrowRepository {
    pool: PgPool,
}

impl EscrowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        conn: &mut PgConnection,
        escrow: &NewEscrow,
    ) -> Result<EscrowRecord, RepositoryError> {
        let record = sqlx::query_as::<_, EscrowRecord>(&format!(
            r#"
            INSERT INTO escrow_records
                (match_id, sender_id, traveler_id, amount, traveler_payout, platform_fee, payment_reference)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            ESCROW_COLUMNS
        ))
        .bind(escrow.match_id)
        .bind(escrow.sender_id)
        .bind(escrow.traveler_id)
        .bind(escrow.amount)
        .bind(escrow.traveler_payout)
        .bind(escrow.platform_fee)
        .bind(&escrow.payment_reference)
        .fetch_one(&mut *conn)
        .await?;

        Ok(record)
    }

    pub async fn find_by_match(&self, match_id: Uuid) -> Result<Option<EscrowRecord>, RepositoryError> {
        let record = sqlx::query_as::<_, EscrowRecord>(&format!(
            "SELECT {} FROM escrow_records WHERE match_id = $1",
            ESCROW_COLUMNS
        ))
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Lock the escrow of a match inside a transaction
    pub async fn find_by_match_for_update(
        conn: &mut PgConnection,
        match_id: Uuid,
    ) -> Result<Option<EscrowRecord>, RepositoryError> {
        let record = sqlx::query_as::<_, EscrowRecord>(&format!(
            "SELECT {} FROM escrow_records WHERE match_id = $1 FOR UPDATE",
            ESCROW_COLUMNS
        ))
        .bind(match_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(record)
    }

    /// Compare-and-set status change, stamping `released_at`/`refunded_at`
    pub async fn transition(
        conn: &mut PgConnection,
        id: Uuid,
        from: EscrowStatus,
        to: EscrowStatus,
    ) -> Result<Option<EscrowRecord>, RepositoryError> {
        let record = sqlx::query_as::<_, EscrowRecord>(&format!(
            r#"
            UPDATE escrow_records
            SET status = $3,
                released_at = CASE WHEN $3 = 'released' THEN NOW() AT TIME ZONE 'utc' ELSE released_at END,
                refunded_at = CASE WHEN $3 = 'refunded' THEN NOW() AT TIME ZONE 'utc' ELSE refunded_at END
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            ESCROW_COLUMNS
        ))
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        Ok(record)
    }

    pub async fn set_auto_release(
        conn: &mut PgConnection,
        id: Uuid,
        release_at: NaiveDateTime,
    ) -> Result<EscrowRecord, RepositoryError> {
        let record = sqlx::query_as::<_, EscrowRecord>(&format!(
            "UPDATE escrow_records SET auto_release_at = $2 WHERE id = $1 RETURNING {}",
            ESCROW_COLUMNS
        ))
        .bind(id)
        .bind(release_at)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Escrow {} not found", id)))?;

        Ok(record)
    }

    /// Held escrows whose auto-release deadline has passed
    pub async fn find_due_for_release(
        &self,
        now: NaiveDateTime,
        limit: i64,
    ) -> Result<Vec<EscrowRecord>, RepositoryError> {
        let records = sqlx::query_as::<_, EscrowRecord>(&format!(
            r#"
            SELECT {}
            FROM escrow_records
            WHERE status = 'held' AND auto_release_at IS NOT NULL AND auto_release_at <= $1
            ORDER BY auto_release_at ASC
            LIMIT $2
            "#,
            ESCROW_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Total still held (or frozen by a dispute) where the user is the sender
    pub async fn total_held_as_sender(&self, user_id: Uuid) -> Result<Decimal, RepositoryError> {
        let (total,): (Decimal,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM escrow_records
            WHERE sender_id = $1 AND status IN ('held', 'disputed')
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }
}

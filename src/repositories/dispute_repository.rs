use crate::error::RepositoryError;
use crate::models::{Dispute, DisputeReason, DisputeResolution, DisputeStatus, MatchStatus};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const DISPUTE_COLUMNS: &str = "id, match_id, opened_by, reason, description, status, \
    previous_match_status, resolution, resolution_note, created_at, resolved_at";

/// Repository for delivery disputes
pub struct DisputeRepository {
    pool: PgPool,
}

impl DisputeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        conn: &mut PgConnection,
        match_id: Uuid,
        opened_by: Uuid,
        reason: DisputeReason,
        description: &str,
        previous_match_status: MatchStatus,
    ) -> Result<Dispute, RepositoryError> {
        let dispute = sqlx::query_as::<_, Dispute>(&format!(
            r#"
            INSERT INTO disputes (match_id, opened_by, reason, description, previous_match_status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            DISPUTE_COLUMNS
        ))
        .bind(match_id)
        .bind(opened_by)
        .bind(reason.as_str())
        .bind(description)
        .bind(previous_match_status.as_str())
        .fetch_one(&mut *conn)
        .await?;

        Ok(dispute)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Dispute>, RepositoryError> {
        let dispute = sqlx::query_as::<_, Dispute>(&format!(
            "SELECT {} FROM disputes WHERE id = $1",
            DISPUTE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(dispute)
    }

    pub async fn find_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Dispute, RepositoryError> {
        let dispute = sqlx::query_as::<_, Dispute>(&format!(
            "SELECT {} FROM disputes WHERE id = $1 FOR UPDATE",
            DISPUTE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Dispute {} not found", id)))?;

        Ok(dispute)
    }

    /// The open or under-review dispute on a match, if any
    pub async fn find_open_for_match(&self, match_id: Uuid) -> Result<Option<Dispute>, RepositoryError> {
        let dispute = sqlx::query_as::<_, Dispute>(&format!(
            "SELECT {} FROM disputes WHERE match_id = $1 AND status IN ('open', 'under_review')",
            DISPUTE_COLUMNS
        ))
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(dispute)
    }

    /// Disputes on matches where the user is sender or traveler
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Dispute>, RepositoryError> {
        let disputes = sqlx::query_as::<_, Dispute>(
            r#"
            SELECT d.id, d.match_id, d.opened_by, d.reason, d.description, d.status,
                   d.previous_match_status, d.resolution, d.resolution_note, d.created_at, d.resolved_at
            FROM disputes d
            JOIN matches m ON m.id = d.match_id
            WHERE m.sender_id = $1 OR m.traveler_id = $1
            ORDER BY d.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(disputes)
    }

    pub async fn count_open_for_user(&self, user_id: Uuid) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM disputes d
            JOIN matches m ON m.id = d.match_id
            WHERE (m.sender_id = $1 OR m.traveler_id = $1)
              AND d.status IN ('open', 'under_review')
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Compare-and-set status change. `resolved` and `withdrawn` stamp `resolved_at`.
    pub async fn transition(
        conn: &mut PgConnection,
        id: Uuid,
        from: &[DisputeStatus],
        to: DisputeStatus,
        resolution: Option<DisputeResolution>,
        note: Option<&str>,
    ) -> Result<Option<Dispute>, RepositoryError> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let closes = !to.is_open();
        let dispute = sqlx::query_as::<_, Dispute>(&format!(
            r#"
            UPDATE disputes
            SET status = $3,
                resolution = COALESCE($4, resolution),
                resolution_note = COALESCE($5, resolution_note),
                resolved_at = CASE WHEN $6 THEN NOW() AT TIME ZONE 'utc' ELSE resolved_at END
            WHERE id = $1 AND status = ANY($2)
            RETURNING {}
            "#,
            DISPUTE_COLUMNS
        ))
        .bind(id)
        .bind(&from)
        .bind(to.as_str())
        .bind(resolution.map(|r| r.as_str()))
        .bind(note)
        .bind(closes)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(dispute)
    }
}

use crate::error::RepositoryError;
use crate::models::{Match, MatchStatus};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const MATCH_COLUMNS: &str = "id, trip_id, parcel_id, sender_id, traveler_id, requested_by, \
    agreed_price, platform_fee, status, delivered_at, cancelled_reason, created_at, updated_at";

/// Fields for a new match request
#[derive(Debug, Clone)]
pub struct NewMatch {
    pub trip_id: Uuid,
    pub parcel_id: Uuid,
    pub sender_id: Uuid,
    pub traveler_id: Uuid,
    pub requested_by: Uuid,
    pub agreed_price: Decimal,
    pub platform_fee: Decimal,
}

/// Per-status match counts for one user
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MatchStatusCount {
    pub status: String,
    pub count: i64,
}

/// Repository for match data access
pub struct MatchRepository {
    pool: PgPool,
}

impl MatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new_match: &NewMatch) -> Result<Match, RepositoryError> {
        let created = sqlx::query_as::<_, Match>(&format!(
            r#"
            INSERT INTO matches
                (trip_id, parcel_id, sender_id, traveler_id, requested_by, agreed_price, platform_fee)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            MATCH_COLUMNS
        ))
        .bind(new_match.trip_id)
        .bind(new_match.parcel_id)
        .bind(new_match.sender_id)
        .bind(new_match.traveler_id)
        .bind(new_match.requested_by)
        .bind(new_match.agreed_price)
        .bind(new_match.platform_fee)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Match>, RepositoryError> {
        let found = sqlx::query_as::<_, Match>(&format!(
            "SELECT {} FROM matches WHERE id = $1",
            MATCH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found)
    }

    /// Lock a match row inside a transaction
    pub async fn find_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Match, RepositoryError> {
        let found = sqlx::query_as::<_, Match>(&format!(
            "SELECT {} FROM matches WHERE id = $1 FOR UPDATE",
            MATCH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Match {} not found", id)))?;

        Ok(found)
    }

    /// Matches where the user is sender or traveler, optionally filtered by status
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<MatchStatus>,
    ) -> Result<Vec<Match>, RepositoryError> {
        let matches = sqlx::query_as::<_, Match>(&format!(
            r#"
            SELECT {}
            FROM matches
            WHERE (sender_id = $1 OR traveler_id = $1)
              AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY updated_at DESC
            "#,
            MATCH_COLUMNS
        ))
        .bind(user_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(matches)
    }

    /// Accepted matches on a trip whose delivery is not finished
    pub async fn count_committed_for_trip(&self, trip_id: Uuid) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM matches WHERE trip_id = $1 AND status NOT IN ('pending', 'cancelled', 'delivered')",
        )
        .bind(trip_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// A pending request already exists for this trip and parcel
    pub async fn pending_exists(&self, trip_id: Uuid, parcel_id: Uuid) -> Result<bool, RepositoryError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM matches WHERE trip_id = $1 AND parcel_id = $2 AND status = 'pending')",
        )
        .bind(trip_id)
        .bind(parcel_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Compare-and-set status change inside a transaction.
    ///
    /// `delivered` stamps `delivered_at` the first time; `reason` is stored
    /// on cancellation. Returns `None` if the match was no longer in `from`.
    pub async fn transition(
        conn: &mut PgConnection,
        id: Uuid,
        from: MatchStatus,
        to: MatchStatus,
        reason: Option<&str>,
    ) -> Result<Option<Match>, RepositoryError> {
        let updated = sqlx::query_as::<_, Match>(&format!(
            r#"
            UPDATE matches
            SET status = $3,
                delivered_at = CASE WHEN $3 = 'delivered'
                                    THEN COALESCE(delivered_at, NOW() AT TIME ZONE 'utc')
                                    ELSE delivered_at END,
                cancelled_reason = CASE WHEN $3 = 'cancelled' THEN $4 ELSE cancelled_reason END,
                updated_at = NOW() AT TIME ZONE 'utc'
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            MATCH_COLUMNS
        ))
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(reason)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(updated)
    }

    /// Cancel every other pending request for a parcel once one is accepted
    pub async fn cancel_competing_requests(
        conn: &mut PgConnection,
        parcel_id: Uuid,
        accepted_id: Uuid,
    ) -> Result<Vec<Match>, RepositoryError> {
        let cancelled = sqlx::query_as::<_, Match>(&format!(
            r#"
            UPDATE matches
            SET status = 'cancelled',
                cancelled_reason = 'Parcel matched with another trip',
                updated_at = NOW() AT TIME ZONE 'utc'
            WHERE parcel_id = $1 AND id <> $2 AND status = 'pending'
            RETURNING {}
            "#,
            MATCH_COLUMNS
        ))
        .bind(parcel_id)
        .bind(accepted_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(cancelled)
    }

    /// Cancel pending requests against a trip that is being withdrawn
    pub async fn cancel_pending_for_trip(
        conn: &mut PgConnection,
        trip_id: Uuid,
        reason: &str,
    ) -> Result<Vec<Match>, RepositoryError> {
        let cancelled = sqlx::query_as::<_, Match>(&format!(
            r#"
            UPDATE matches
            SET status = 'cancelled', cancelled_reason = $2,
                updated_at = NOW() AT TIME ZONE 'utc'
            WHERE trip_id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            MATCH_COLUMNS
        ))
        .bind(trip_id)
        .bind(reason)
        .fetch_all(&mut *conn)
        .await?;

        Ok(cancelled)
    }

    /// Cancel pending requests for a parcel the sender withdrew
    pub async fn cancel_pending_for_parcel(
        conn: &mut PgConnection,
        parcel_id: Uuid,
        reason: &str,
    ) -> Result<Vec<Match>, RepositoryError> {
        let cancelled = sqlx::query_as::<_, Match>(&format!(
            r#"
            UPDATE matches
            SET status = 'cancelled', cancelled_reason = $2,
                updated_at = NOW() AT TIME ZONE 'utc'
            WHERE parcel_id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            MATCH_COLUMNS
        ))
        .bind(parcel_id)
        .bind(reason)
        .fetch_all(&mut *conn)
        .await?;

        Ok(cancelled)
    }

    pub async fn count_by_status_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<MatchStatusCount>, RepositoryError> {
        let counts = sqlx::query_as::<_, MatchStatusCount>(
            r#"
            SELECT status, COUNT(*) AS count
            FROM matches
            WHERE sender_id = $1 OR traveler_id = $1
            GROUP BY status
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(counts)
    }
}

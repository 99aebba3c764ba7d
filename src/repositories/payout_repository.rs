use crate::error::RepositoryError;
use crate::models::{PayoutMethod, PayoutMethodKind, Withdrawal, WithdrawalStatus};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Repository for payout methods and withdrawal requests
pub struct PayoutRepository {
    pool: PgPool,
}

impl PayoutRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Payout Methods
    // =========================================================================

    /// Store a payout method. The user's first method becomes the default.
    pub async fn add_method(
        &self,
        user_id: Uuid,
        kind: PayoutMethodKind,
        label: &str,
        account_last4: &str,
    ) -> Result<PayoutMethod, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // serialize concurrent inserts for the same user on the wallet row
        sqlx::query("INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("SELECT user_id FROM wallets WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let (existing,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM payout_methods WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;

        let method = sqlx::query_as::<_, PayoutMethod>(
            r#"
            INSERT INTO payout_methods (user_id, kind, label, account_last4, is_default)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, kind, label, account_last4, is_default, created_at
            "#,
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(label)
        .bind(account_last4)
        .bind(existing == 0)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(method)
    }

    pub async fn list_methods(&self, user_id: Uuid) -> Result<Vec<PayoutMethod>, RepositoryError> {
        let methods = sqlx::query_as::<_, PayoutMethod>(
            r#"
            SELECT id, user_id, kind, label, account_last4, is_default, created_at
            FROM payout_methods
            WHERE user_id = $1
            ORDER BY is_default DESC, created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(methods)
    }

    pub async fn find_method(&self, id: Uuid) -> Result<Option<PayoutMethod>, RepositoryError> {
        let method = sqlx::query_as::<_, PayoutMethod>(
            r#"
            SELECT id, user_id, kind, label, account_last4, is_default, created_at
            FROM payout_methods
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(method)
    }

    /// Delete a payout method; when the default goes, the oldest remaining
    /// method is promoted.
    pub async fn remove_method(&self, user_id: Uuid, id: Uuid) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let (in_use,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM withdrawals
                WHERE payout_method_id = $1 AND status IN ('pending', 'processing')
            )
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if in_use {
            return Err(RepositoryError::BusinessRule(
                "Payout method has withdrawals in progress".to_string(),
            ));
        }

        let removed: Option<(bool,)> = sqlx::query_as(
            "DELETE FROM payout_methods WHERE id = $1 AND user_id = $2 RETURNING is_default",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| match RepositoryError::from(e) {
            // completed withdrawals still reference the method
            RepositoryError::ConstraintViolation(_) => RepositoryError::BusinessRule(
                "Payout method has withdrawal history and cannot be removed".to_string(),
            ),
            other => other,
        })?;

        let Some((was_default,)) = removed else {
            return Ok(false);
        };

        if was_default {
            sqlx::query(
                r#"
                UPDATE payout_methods SET is_default = TRUE
                WHERE id = (
                    SELECT id FROM payout_methods WHERE user_id = $1
                    ORDER BY created_at ASC LIMIT 1
                )
                "#,
            )
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(true)
    }

    // =========================================================================
    // Withdrawals
    // =========================================================================

    pub async fn create_withdrawal(
        conn: &mut PgConnection,
        user_id: Uuid,
        payout_method_id: Uuid,
        amount: Decimal,
    ) -> Result<Withdrawal, RepositoryError> {
        let withdrawal = sqlx::query_as::<_, Withdrawal>(
            r#"
            INSERT INTO withdrawals (user_id, payout_method_id, amount)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, payout_method_id, amount, status, failure_reason, created_at, processed_at
            "#,
        )
        .bind(user_id)
        .bind(payout_method_id)
        .bind(amount)
        .fetch_one(&mut *conn)
        .await?;

        Ok(withdrawal)
    }

    pub async fn find_withdrawal(&self, id: Uuid) -> Result<Option<Withdrawal>, RepositoryError> {
        let withdrawal = sqlx::query_as::<_, Withdrawal>(
            r#"
            SELECT id, user_id, payout_method_id, amount, status, failure_reason, created_at, processed_at
            FROM withdrawals
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(withdrawal)
    }

    pub async fn list_withdrawals(&self, user_id: Uuid) -> Result<Vec<Withdrawal>, RepositoryError> {
        let withdrawals = sqlx::query_as::<_, Withdrawal>(
            r#"
            SELECT id, user_id, payout_method_id, amount, status, failure_reason, created_at, processed_at
            FROM withdrawals
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(withdrawals)
    }

    /// Compare-and-set status change. Final states stamp `processed_at`.
    pub async fn transition_withdrawal(
        conn: &mut PgConnection,
        id: Uuid,
        from: &[WithdrawalStatus],
        to: WithdrawalStatus,
        failure_reason: Option<&str>,
    ) -> Result<Option<Withdrawal>, RepositoryError> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let withdrawal = sqlx::query_as::<_, Withdrawal>(
            r#"
            UPDATE withdrawals
            SET status = $3,
                failure_reason = COALESCE($4, failure_reason),
                processed_at = CASE WHEN $5 THEN NOW() AT TIME ZONE 'utc' ELSE processed_at END
            WHERE id = $1 AND status = ANY($2)
            RETURNING id, user_id, payout_method_id, amount, status, failure_reason, created_at, processed_at
            "#,
        )
        .bind(id)
        .bind(&from)
        .bind(to.as_str())
        .bind(failure_reason)
        .bind(to.is_final())
        .fetch_optional(&mut *conn)
        .await?;

        Ok(withdrawal)
    }
}

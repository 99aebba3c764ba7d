//! Repository for wallet balances and the wallet ledger.
//!
//! Every change to `available_balance` writes one `wallet_transactions` row in
//! the same transaction, recording the balance before and after. Pending
//! balances track traveler earnings still sitting in escrow and are not
//! ledgered.

use crate::error::RepositoryError;
use crate::models::{TransactionType, Wallet, WalletTransaction};
use crate::pricing::round_money;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Ledger amounts are positive and already in whole cents
fn check_amount(amount: Decimal, action: &str) -> Result<(), RepositoryError> {
    if amount <= Decimal::ZERO {
        return Err(RepositoryError::InvalidInput(format!(
            "{} amount must be positive",
            action
        )));
    }
    if round_money(amount) != amount {
        return Err(RepositoryError::InvalidInput(format!(
            "{} amount {} has more than two decimal places",
            action, amount
        )));
    }
    Ok(())
}

/// Optional links and text recorded on a ledger row
#[derive(Debug, Clone, Default)]
pub struct LedgerEntry<'a> {
    pub match_id: Option<Uuid>,
    pub withdrawal_id: Option<Uuid>,
    pub description: Option<&'a str>,
}

pub struct WalletRepository {
    pool: PgPool,
}

impl WalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get or create a user's wallet
    pub async fn get_or_create(&self, user_id: Uuid) -> Result<Wallet, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Self::ensure(&mut conn, user_id).await?;

        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT user_id, available_balance, pending_balance, currency, updated_at
            FROM wallets
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(wallet)
    }

    async fn ensure(conn: &mut PgConnection, user_id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn lock(conn: &mut PgConnection, user_id: Uuid) -> Result<Wallet, RepositoryError> {
        Self::ensure(conn, user_id).await?;
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT user_id, available_balance, pending_balance, currency, updated_at
            FROM wallets
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(wallet)
    }

    async fn record(
        conn: &mut PgConnection,
        user_id: Uuid,
        tx_type: TransactionType,
        amount: Decimal,
        balance_before: Decimal,
        balance_after: Decimal,
        entry: &LedgerEntry<'_>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO wallet_transactions
                (user_id, match_id, withdrawal_id, transaction_type, amount,
                 balance_before, balance_after, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user_id)
        .bind(entry.match_id)
        .bind(entry.withdrawal_id)
        .bind(tx_type.as_str())
        .bind(amount)
        .bind(balance_before)
        .bind(balance_after)
        .bind(entry.description)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Add funds to the available balance
    pub async fn credit(
        conn: &mut PgConnection,
        user_id: Uuid,
        amount: Decimal,
        tx_type: TransactionType,
        entry: &LedgerEntry<'_>,
    ) -> Result<Wallet, RepositoryError> {
        check_amount(amount, "Credit")?;
        let current = Self::lock(conn, user_id).await?;
        let balance_after = current.available_balance + amount;

        let updated = sqlx::query_as::<_, Wallet>(
            r#"
            UPDATE wallets
            SET available_balance = $2, updated_at = NOW() AT TIME ZONE 'utc'
            WHERE user_id = $1
            RETURNING user_id, available_balance, pending_balance, currency, updated_at
            "#,
        )
        .bind(user_id)
        .bind(balance_after)
        .fetch_one(&mut *conn)
        .await?;

        Self::record(
            conn,
            user_id,
            tx_type,
            amount,
            current.available_balance,
            balance_after,
            entry,
        )
        .await?;

        Ok(updated)
    }

    /// Take funds from the available balance
    pub async fn debit(
        conn: &mut PgConnection,
        user_id: Uuid,
        amount: Decimal,
        tx_type: TransactionType,
        entry: &LedgerEntry<'_>,
    ) -> Result<Wallet, RepositoryError> {
        check_amount(amount, "Debit")?;
        let current = Self::lock(conn, user_id).await?;
        if current.available_balance < amount {
            return Err(RepositoryError::BusinessRule(format!(
                "Insufficient balance: available {}, required {}",
                current.available_balance, amount
            )));
        }
        let balance_after = current.available_balance - amount;

        let updated = sqlx::query_as::<_, Wallet>(
            r#"
            UPDATE wallets
            SET available_balance = $2, updated_at = NOW() AT TIME ZONE 'utc'
            WHERE user_id = $1
            RETURNING user_id, available_balance, pending_balance, currency, updated_at
            "#,
        )
        .bind(user_id)
        .bind(balance_after)
        .fetch_one(&mut *conn)
        .await?;

        Self::record(
            conn,
            user_id,
            tx_type,
            amount,
            current.available_balance,
            balance_after,
            entry,
        )
        .await?;

        Ok(updated)
    }

    /// Earnings now held in escrow for this user
    pub async fn add_pending(
        conn: &mut PgConnection,
        user_id: Uuid,
        amount: Decimal,
    ) -> Result<Wallet, RepositoryError> {
        check_amount(amount, "Pending")?;
        Self::lock(conn, user_id).await?;
        let updated = sqlx::query_as::<_, Wallet>(
            r#"
            UPDATE wallets
            SET pending_balance = pending_balance + $2, updated_at = NOW() AT TIME ZONE 'utc'
            WHERE user_id = $1
            RETURNING user_id, available_balance, pending_balance, currency, updated_at
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&mut *conn)
        .await?;

        Ok(updated)
    }

    /// Drop pending earnings that will not be paid (refunded escrow)
    pub async fn remove_pending(
        conn: &mut PgConnection,
        user_id: Uuid,
        amount: Decimal,
    ) -> Result<Wallet, RepositoryError> {
        Self::lock(conn, user_id).await?;
        let updated = sqlx::query_as::<_, Wallet>(
            r#"
            UPDATE wallets
            SET pending_balance = GREATEST(0, pending_balance - $2),
                updated_at = NOW() AT TIME ZONE 'utc'
            WHERE user_id = $1
            RETURNING user_id, available_balance, pending_balance, currency, updated_at
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&mut *conn)
        .await?;

        Ok(updated)
    }

    /// Move released escrow from pending to available, with a ledger row
    pub async fn settle_pending(
        conn: &mut PgConnection,
        user_id: Uuid,
        amount: Decimal,
        entry: &LedgerEntry<'_>,
    ) -> Result<Wallet, RepositoryError> {
        check_amount(amount, "Settlement")?;
        let current = Self::lock(conn, user_id).await?;
        let balance_after = current.available_balance + amount;
        let pending_after = (current.pending_balance - amount).max(Decimal::ZERO);

        let updated = sqlx::query_as::<_, Wallet>(
            r#"
            UPDATE wallets
            SET available_balance = $2, pending_balance = $3,
                updated_at = NOW() AT TIME ZONE 'utc'
            WHERE user_id = $1
            RETURNING user_id, available_balance, pending_balance, currency, updated_at
            "#,
        )
        .bind(user_id)
        .bind(balance_after)
        .bind(pending_after)
        .fetch_one(&mut *conn)
        .await?;

        Self::record(
            conn,
            user_id,
            TransactionType::EscrowRelease,
            amount,
            current.available_balance,
            balance_after,
            entry,
        )
        .await?;

        Ok(updated)
    }

    // =========================================================================
    // Transaction History
    // =========================================================================

    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WalletTransaction>, RepositoryError> {
        let transactions = sqlx::query_as::<_, WalletTransaction>(
            r#"
            SELECT id, user_id, match_id, withdrawal_id, transaction_type, amount,
                   balance_before, balance_after, description, created_at
            FROM wallet_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }
}

use crate::cache::{CacheKeys, CacheService, CacheTtl};
use crate::config::EscrowConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    mask_account, PayoutMethod, PayoutMethodKind, TransactionType, Wallet, WalletTransaction,
    Withdrawal, WithdrawalStatus,
};
use crate::pricing::round_money;
use crate::repositories::{LedgerEntry, PayoutRepository, UserRepository, WalletRepository};
use crate::services::audit::AuditTrailService;
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_PAGE: i64 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct AddPayoutMethod {
    pub kind: PayoutMethodKind,
    pub label: String,
    /// Full account number or handle; only the last four characters are kept
    pub account_identifier: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestWithdrawal {
    pub amount: Decimal,
    pub payout_method_id: Uuid,
}

pub struct WalletService {
    wallet_repo: Arc<WalletRepository>,
    payout_repo: Arc<PayoutRepository>,
    user_repo: Arc<UserRepository>,
    cache: CacheService,
    audit: Arc<AuditTrailService>,
    pool: PgPool,
    min_withdrawal: Decimal,
}

impl WalletService {
    pub fn new(
        wallet_repo: Arc<WalletRepository>,
        payout_repo: Arc<PayoutRepository>,
        user_repo: Arc<UserRepository>,
        cache: CacheService,
        audit: Arc<AuditTrailService>,
        pool: PgPool,
        config: &EscrowConfig,
    ) -> Self {
        Self {
            wallet_repo,
            payout_repo,
            user_repo,
            cache,
            audit,
            pool,
            min_withdrawal: config.min_withdrawal_amount,
        }
    }

    pub async fn get_wallet(&self, user_id: Uuid) -> AppResult<Wallet> {
        let repo = self.wallet_repo.clone();
        self.cache
            .get_or_set(&CacheKeys::wallet(user_id), CacheTtl::Short, || async move {
                Ok::<_, AppError>(repo.get_or_create(user_id).await?)
            })
            .await
    }

    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> AppResult<Vec<WalletTransaction>> {
        let limit = limit.unwrap_or(50).clamp(1, MAX_PAGE);
        let offset = offset.unwrap_or(0).max(0);
        Ok(self
            .wallet_repo
            .list_transactions(user_id, limit, offset)
            .await?)
    }

    // =========================================================================
    // Payout Methods
    // =========================================================================

    pub async fn add_payout_method(
        &self,
        user_id: Uuid,
        request: AddPayoutMethod,
    ) -> AppResult<PayoutMethod> {
        let label = request.label.trim();
        if label.is_empty() || label.chars().count() > 80 {
            return Err(AppError::Validation(
                "Label must be between 1 and 80 characters".to_string(),
            ));
        }
        let last4 = mask_account(&request.account_identifier);
        if last4.chars().count() < 4 {
            return Err(AppError::Validation(
                "Account identifier must have at least 4 characters".to_string(),
            ));
        }

        let method = self
            .payout_repo
            .add_method(user_id, request.kind, label, &last4)
            .await?;
        info!("Payout method {} added for user {}", method.id, user_id);
        Ok(method)
    }

    pub async fn list_payout_methods(&self, user_id: Uuid) -> AppResult<Vec<PayoutMethod>> {
        Ok(self.payout_repo.list_methods(user_id).await?)
    }

    pub async fn remove_payout_method(&self, user_id: Uuid, method_id: Uuid) -> AppResult<()> {
        if !self.payout_repo.remove_method(user_id, method_id).await? {
            return Err(AppError::NotFound(format!(
                "Payout method {} not found",
                method_id
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Withdrawals
    // =========================================================================

    /// Funds leave the available balance as soon as the request is accepted
    pub async fn request_withdrawal(
        &self,
        user_id: Uuid,
        request: RequestWithdrawal,
    ) -> AppResult<Withdrawal> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
        if !user.is_kyc_verified() {
            return Err(AppError::Forbidden(
                "Identity verification is required before withdrawing".to_string(),
            ));
        }
        if request.amount < self.min_withdrawal || request.amount <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Minimum withdrawal is {}",
                self.min_withdrawal
            )));
        }
        if round_money(request.amount) != request.amount {
            return Err(AppError::Validation(
                "Withdrawal amount must be in whole cents".to_string(),
            ));
        }
        let method = self
            .payout_repo
            .find_method(request.payout_method_id)
            .await?
            .filter(|m| m.user_id == user_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Payout method {} not found",
                    request.payout_method_id
                ))
            })?;

        let mut tx = self.pool.begin().await?;
        let withdrawal =
            PayoutRepository::create_withdrawal(&mut *tx, user_id, method.id, request.amount).await?;
        WalletRepository::debit(
            &mut *tx,
            user_id,
            request.amount,
            TransactionType::Withdrawal,
            &LedgerEntry {
                withdrawal_id: Some(withdrawal.id),
                description: Some("Withdrawal requested"),
                ..Default::default()
            },
        )
        .await?;
        tx.commit().await?;

        info!(
            "Withdrawal {} of {} requested by {}",
            withdrawal.id, withdrawal.amount, user_id
        );
        self.after_change(&withdrawal, Some(user_id)).await;
        Ok(withdrawal)
    }

    pub async fn list_withdrawals(&self, user_id: Uuid) -> AppResult<Vec<Withdrawal>> {
        Ok(self.payout_repo.list_withdrawals(user_id).await?)
    }

    /// Handed to the payout provider; the owner can no longer cancel it
    pub async fn start_processing(&self, withdrawal_id: Uuid) -> AppResult<Withdrawal> {
        let mut tx = self.pool.begin().await?;
        let processing = PayoutRepository::transition_withdrawal(
            &mut *tx,
            withdrawal_id,
            &[WithdrawalStatus::Pending],
            WithdrawalStatus::Processing,
            None,
        )
        .await?
        .ok_or_else(|| {
            AppError::Conflict(format!("Withdrawal {} is not pending", withdrawal_id))
        })?;
        tx.commit().await?;

        info!("Withdrawal {} is processing", withdrawal_id);
        self.after_change(&processing, None).await;
        Ok(processing)
    }

    /// Payout provider confirmed the transfer
    pub async fn complete_withdrawal(&self, withdrawal_id: Uuid) -> AppResult<Withdrawal> {
        let mut tx = self.pool.begin().await?;
        let completed = PayoutRepository::transition_withdrawal(
            &mut *tx,
            withdrawal_id,
            &[WithdrawalStatus::Pending, WithdrawalStatus::Processing],
            WithdrawalStatus::Completed,
            None,
        )
        .await?
        .ok_or_else(|| self.not_in_flight(withdrawal_id))?;
        tx.commit().await?;

        info!("Withdrawal {} completed", withdrawal_id);
        self.after_change(&completed, None).await;
        Ok(completed)
    }

    /// Payout provider rejected the transfer; the money goes back
    pub async fn fail_withdrawal(&self, withdrawal_id: Uuid, reason: &str) -> AppResult<Withdrawal> {
        let reason = reason.trim();
        let reason = if reason.is_empty() { "Payout failed" } else { reason };

        let mut tx = self.pool.begin().await?;
        let failed = PayoutRepository::transition_withdrawal(
            &mut *tx,
            withdrawal_id,
            &[WithdrawalStatus::Pending, WithdrawalStatus::Processing],
            WithdrawalStatus::Failed,
            Some(reason),
        )
        .await?
        .ok_or_else(|| self.not_in_flight(withdrawal_id))?;
        self.reverse(&mut tx, &failed, "Withdrawal failed").await?;
        tx.commit().await?;

        warn!("Withdrawal {} failed: {}", withdrawal_id, reason);
        self.after_change(&failed, None).await;
        Ok(failed)
    }

    /// Owner cancels a withdrawal that has not been picked up yet
    pub async fn cancel_withdrawal(&self, user_id: Uuid, withdrawal_id: Uuid) -> AppResult<Withdrawal> {
        let withdrawal = self
            .payout_repo
            .find_withdrawal(withdrawal_id)
            .await?
            .filter(|w| w.user_id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("Withdrawal {} not found", withdrawal_id)))?;

        let mut tx = self.pool.begin().await?;
        let cancelled = PayoutRepository::transition_withdrawal(
            &mut *tx,
            withdrawal.id,
            &[WithdrawalStatus::Pending],
            WithdrawalStatus::Cancelled,
            None,
        )
        .await?
        .ok_or_else(|| {
            AppError::Conflict("Only pending withdrawals can be cancelled".to_string())
        })?;
        self.reverse(&mut tx, &cancelled, "Withdrawal cancelled").await?;
        tx.commit().await?;

        self.after_change(&cancelled, Some(user_id)).await;
        Ok(cancelled)
    }

    async fn reverse(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        withdrawal: &Withdrawal,
        description: &str,
    ) -> AppResult<()> {
        WalletRepository::credit(
            &mut **tx,
            withdrawal.user_id,
            withdrawal.amount,
            TransactionType::WithdrawalReversal,
            &LedgerEntry {
                withdrawal_id: Some(withdrawal.id),
                description: Some(description),
                ..Default::default()
            },
        )
        .await?;
        Ok(())
    }

    fn not_in_flight(&self, withdrawal_id: Uuid) -> AppError {
        AppError::Conflict(format!(
            "Withdrawal {} is not pending or processing",
            withdrawal_id
        ))
    }

    async fn after_change(&self, withdrawal: &Withdrawal, actor_id: Option<Uuid>) {
        self.audit.log_withdrawal(withdrawal, actor_id).await;
        self.cache.invalidate_users(&[withdrawal.user_id]).await;
    }
}

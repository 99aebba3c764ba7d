//! Wallet, ledger and payout models for fund tracking

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A user's platform balance
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: Uuid,
    /// Withdrawable funds
    pub available_balance: Decimal,
    /// Earnings still held in escrow
    pub pending_balance: Decimal,
    pub currency: String,
    pub updated_at: NaiveDateTime,
}

impl Wallet {
    pub fn total(&self) -> Decimal {
        self.available_balance + self.pending_balance
    }
}

/// Ledger entry types for fund movements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    EscrowRelease,
    Refund,
    Withdrawal,
    WithdrawalReversal,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EscrowRelease => "escrow_release",
            Self::Refund => "refund",
            Self::Withdrawal => "withdrawal",
            Self::WithdrawalReversal => "withdrawal_reversal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "escrow_release" => Some(Self::EscrowRelease),
            "refund" => Some(Self::Refund),
            "withdrawal" => Some(Self::Withdrawal),
            "withdrawal_reversal" => Some(Self::WithdrawalReversal),
            _ => None,
        }
    }

    pub fn is_credit(&self) -> bool {
        !matches!(self, Self::Withdrawal)
    }
}

/// Ledger row for the wallet audit trail
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub match_id: Option<Uuid>,
    pub withdrawal_id: Option<Uuid>,
    pub transaction_type: String,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

impl WalletTransaction {
    pub fn tx_type(&self) -> Option<TransactionType> {
        TransactionType::from_str(&self.transaction_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethodKind {
    BankAccount,
    MobileMoney,
    Paypal,
}

impl PayoutMethodKind {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "bank_account" => Ok(Self::BankAccount),
            "mobile_money" => Ok(Self::MobileMoney),
            "paypal" => Ok(Self::Paypal),
            _ => Err(format!("Invalid payout method: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BankAccount => "bank_account",
            Self::MobileMoney => "mobile_money",
            Self::Paypal => "paypal",
        }
    }
}

/// Where withdrawals are paid out to. Only the last four characters of the
/// account identifier are stored.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PayoutMethod {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub label: String,
    pub account_last4: String,
    pub is_default: bool,
    pub created_at: NaiveDateTime,
}

/// Keep the last four characters of an account number or handle
pub fn mask_account(identifier: &str) -> String {
    let compact: Vec<char> = identifier.chars().filter(|c| !c.is_whitespace()).collect();
    let start = compact.len().saturating_sub(4);
    compact[start..].iter().collect()
}

/// Withdrawal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl WithdrawalStatus {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid withdrawal status: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl From<String> for WithdrawalStatus {
    fn from(s: String) -> Self {
        Self::from_str(&s).unwrap_or(Self::Pending)
    }
}

/// Payout request from a wallet to a payout method
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub payout_method_id: Uuid,
    pub amount: Decimal,
    pub status: String,
    pub failure_reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub processed_at: Option<NaiveDateTime>,
}

impl Withdrawal {
    pub fn status_enum(&self) -> WithdrawalStatus {
        WithdrawalStatus::from_str(&self.status).unwrap_or(WithdrawalStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_account() {
        assert_eq!(mask_account("GB29 NWBK 6016 1331 9268 19"), "6819");
        assert_eq!(mask_account("123"), "123");
        assert_eq!(mask_account(""), "");
    }

    #[test]
    fn test_transaction_direction() {
        assert!(TransactionType::EscrowRelease.is_credit());
        assert!(TransactionType::WithdrawalReversal.is_credit());
        assert!(!TransactionType::Withdrawal.is_credit());
    }
}

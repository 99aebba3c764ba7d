//! Domain models for the Airbar backend.
//!
//! This module contains all database-backed models representing
//! the core entities of the parcel delivery marketplace.

pub mod dispute;
pub mod escrow;
pub mod matching;
pub mod parcel;
pub mod trip;
pub mod user;
pub mod wallet;

// Re-export all models for convenient access
pub use dispute::{Dispute, DisputeReason, DisputeResolution, DisputeStatus};
pub use escrow::{EscrowRecord, EscrowStatus};
pub use matching::{Match, MatchStatus};
pub use parcel::{Parcel, ParcelCategory, ParcelSearch, ParcelStatus};
pub use trip::{Trip, TripSearch, TripSort, TripStatus};
pub use user::{KycStatus, User, UserRole};
pub use wallet::{
    mask_account, PayoutMethod, PayoutMethodKind, TransactionType, Wallet, WalletTransaction,
    Withdrawal, WithdrawalStatus,
};

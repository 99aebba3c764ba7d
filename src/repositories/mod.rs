pub mod dispute_repository;
pub mod escrow_repository;
pub mod match_repository;
pub mod parcel_repository;
pub mod payout_repository;
pub mod trip_repository;
pub mod user_repository;
pub mod wallet_repository;

// Re-export all repositories for convenient access
pub use dispute_repository::DisputeRepository;
pub use escrow_repository::{EscrowRepository, NewEscrow};
pub use match_repository::{MatchRepository, MatchStatusCount, NewMatch};
pub use parcel_repository::{NewParcel, ParcelRepository};
pub use payout_repository::PayoutRepository;
pub use trip_repository::{NewTrip, TripChanges, TripRepository};
pub use user_repository::UserRepository;
pub use wallet_repository::{LedgerEntry, WalletRepository};

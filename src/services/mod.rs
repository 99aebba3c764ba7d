pub mod audit;
pub mod dashboard_service;
pub mod dispute_service;
pub mod escrow_service;
pub mod match_service;
pub mod parcel_service;
pub mod trip_service;
pub mod user_service;
pub mod wallet_service;

pub use audit::AuditTrailService;
pub use dashboard_service::{Dashboard, DashboardService};
pub use dispute_service::{DisputeService, OpenDispute, ResolveDispute};
pub use escrow_service::EscrowService;
pub use match_service::{CancelMatch, MatchService, PayMatch, RequestMatch};
pub use parcel_service::{CreateParcel, ParcelService};
pub use trip_service::{CreateTrip, TripService, TripStats, UpdateTrip};
pub use user_service::{RegisterUser, UpdateProfile, UserService};
pub use wallet_service::{AddPayoutMethod, RequestWithdrawal, WalletService};

//! Airbar Backend Library
//!
//! This module exposes the backend components for use by the binary and tests.

pub mod auth;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod pricing;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod sweeper;
pub mod websocket;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};

use cache::CacheService;
use database::Database;
use pricing::PriceEstimator;
use repositories::*;
use services::*;
use std::sync::Arc;
use websocket::WebSocketServer;

/// Application state containing all repositories and services
pub struct AppState {
    pub config: AppConfig,
    pub database: Database,
    pub cache: CacheService,
    pub ws_server: Arc<WebSocketServer>,
    pub audit: Arc<AuditTrailService>,
    pub estimator: Arc<PriceEstimator>,
    pub trip_repo: Arc<TripRepository>,
    pub users: UserService,
    pub trips: TripService,
    pub parcels: ParcelService,
    pub matches: MatchService,
    pub escrow: Arc<EscrowService>,
    pub disputes: DisputeService,
    pub wallets: WalletService,
    pub dashboard: DashboardService,
}

impl AppState {
    /// Wire repositories and services over one pool and cache
    pub fn new(
        config: AppConfig,
        pool: sqlx::PgPool,
        cache: CacheService,
        audit: AuditTrailService,
    ) -> Self {
        let database = Database::new(pool.clone());
        let ws_server = Arc::new(WebSocketServer::new());
        let audit = Arc::new(audit);
        let estimator = Arc::new(PriceEstimator::new(config.pricing.clone()));

        let user_repo = Arc::new(UserRepository::new(pool.clone()));
        let trip_repo = Arc::new(TripRepository::new(pool.clone()));
        let parcel_repo = Arc::new(ParcelRepository::new(pool.clone()));
        let match_repo = Arc::new(MatchRepository::new(pool.clone()));
        let escrow_repo = Arc::new(EscrowRepository::new(pool.clone()));
        let dispute_repo = Arc::new(DisputeRepository::new(pool.clone()));
        let wallet_repo = Arc::new(WalletRepository::new(pool.clone()));
        let payout_repo = Arc::new(PayoutRepository::new(pool.clone()));

        let escrow = Arc::new(EscrowService::new(
            escrow_repo.clone(),
            cache.clone(),
            ws_server.clone(),
            audit.clone(),
            pool.clone(),
            config.escrow.clone(),
        ));

        Self {
            users: UserService::new(user_repo.clone(), cache.clone()),
            trips: TripService::new(
                trip_repo.clone(),
                match_repo.clone(),
                user_repo.clone(),
                cache.clone(),
                ws_server.clone(),
                pool.clone(),
            ),
            parcels: ParcelService::new(
                parcel_repo.clone(),
                user_repo.clone(),
                cache.clone(),
                ws_server.clone(),
                pool.clone(),
            ),
            matches: MatchService::new(
                match_repo.clone(),
                trip_repo.clone(),
                parcel_repo.clone(),
                escrow.clone(),
                estimator.clone(),
                cache.clone(),
                ws_server.clone(),
                audit.clone(),
                pool.clone(),
            ),
            disputes: DisputeService::new(
                dispute_repo.clone(),
                match_repo.clone(),
                escrow.clone(),
                cache.clone(),
                ws_server.clone(),
                audit.clone(),
                pool.clone(),
            ),
            wallets: WalletService::new(
                wallet_repo.clone(),
                payout_repo,
                user_repo,
                cache.clone(),
                audit.clone(),
                pool,
                &config.escrow,
            ),
            dashboard: DashboardService::new(
                trip_repo.clone(),
                parcel_repo,
                match_repo,
                wallet_repo,
                escrow_repo,
                dispute_repo,
                cache.clone(),
            ),
            config,
            database,
            cache,
            ws_server,
            audit,
            estimator,
            trip_repo,
            escrow,
        }
    }

    /// Background sweeper over this state's escrow service and trips
    pub fn sweeper(&self) -> sweeper::Sweeper {
        sweeper::Sweeper::new(
            self.escrow.clone(),
            self.trip_repo.clone(),
            self.cache.clone(),
            self.config.escrow.sweep_interval(),
        )
    }
}

use crate::cache::{CacheKeys, CacheService};
use crate::error::AppResult;
use crate::repositories::TripRepository;
use crate::services::EscrowService;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info};

/// What one sweep changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub escrows_released: usize,
    pub trips_expired: usize,
}

/// Background task for time-driven state changes: escrow auto-release once
/// the confirmation window lapses, and expiry of trips that already departed.
pub struct Sweeper {
    escrow: Arc<EscrowService>,
    trip_repo: Arc<TripRepository>,
    cache: CacheService,
    interval: Duration,
}

impl Sweeper {
    pub fn new(
        escrow: Arc<EscrowService>,
        trip_repo: Arc<TripRepository>,
        cache: CacheService,
        interval: Duration,
    ) -> Self {
        Self {
            escrow,
            trip_repo,
            cache,
            interval,
        }
    }

    /// Run forever. A failed sweep is logged and retried on the next tick.
    pub async fn start(self) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        info!("Sweeper started, running every {:?}", self.interval);

        loop {
            interval.tick().await;

            if let Err(e) = self.sweep().await {
                error!("Sweep failed: {}", e);
            }
        }
    }

    pub async fn sweep(&self) -> AppResult<SweepReport> {
        let now = Utc::now();
        let escrows_released = self.escrow.release_due(now.naive_utc()).await?;

        let expired = self.trip_repo.expire_departed(now.date_naive()).await?;
        if !expired.is_empty() {
            let keys: Vec<String> = expired.iter().map(|id| CacheKeys::trip(*id)).collect();
            self.cache.delete_many(&keys).await;
            self.cache.delete_pattern(CacheKeys::all_trip_searches()).await;
        }

        let purged = self.cache.purge_expired();
        if purged > 0 {
            debug!("Purged {} expired cache entries", purged);
        }

        let report = SweepReport {
            escrows_released,
            trips_expired: expired.len(),
        };
        if report != SweepReport::default() {
            info!(
                "Sweep released {} escrows, expired {} trips",
                report.escrows_released, report.trips_expired
            );
        }
        Ok(report)
    }
}

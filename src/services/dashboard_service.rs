use crate::cache::{CacheKeys, CacheService, CacheTtl};
use crate::error::{AppError, AppResult};
use crate::models::MatchStatus;
use crate::repositories::{
    DisputeRepository, EscrowRepository, MatchRepository, MatchStatusCount, ParcelRepository,
    TripRepository, WalletRepository,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Summary shown on a user's home screen
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dashboard {
    pub user_id: Uuid,
    pub active_trips: i64,
    pub open_parcels: i64,
    pub matches_by_status: BTreeMap<String, i64>,
    pub active_matches: i64,
    pub available_balance: Decimal,
    pub pending_earnings: Decimal,
    pub escrow_held_as_sender: Decimal,
    pub open_disputes: i64,
}

/// Every known status appears, zero when the user has none
fn status_breakdown(counts: &[MatchStatusCount]) -> (BTreeMap<String, i64>, i64) {
    let mut by_status: BTreeMap<String, i64> = MatchStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    let mut active = 0;
    for row in counts {
        if let Ok(status) = MatchStatus::from_str(&row.status) {
            if status.is_active() {
                active += row.count;
            }
        }
        *by_status.entry(row.status.clone()).or_insert(0) += row.count;
    }
    (by_status, active)
}

#[derive(Clone)]
pub struct DashboardService {
    trip_repo: Arc<TripRepository>,
    parcel_repo: Arc<ParcelRepository>,
    match_repo: Arc<MatchRepository>,
    wallet_repo: Arc<WalletRepository>,
    escrow_repo: Arc<EscrowRepository>,
    dispute_repo: Arc<DisputeRepository>,
    cache: CacheService,
}

impl DashboardService {
    pub fn new(
        trip_repo: Arc<TripRepository>,
        parcel_repo: Arc<ParcelRepository>,
        match_repo: Arc<MatchRepository>,
        wallet_repo: Arc<WalletRepository>,
        escrow_repo: Arc<EscrowRepository>,
        dispute_repo: Arc<DisputeRepository>,
        cache: CacheService,
    ) -> Self {
        Self {
            trip_repo,
            parcel_repo,
            match_repo,
            wallet_repo,
            escrow_repo,
            dispute_repo,
            cache,
        }
    }

    pub async fn get(&self, user_id: Uuid) -> AppResult<Dashboard> {
        let this = self.clone();
        self.cache
            .get_or_set(&CacheKeys::user_dashboard(user_id), CacheTtl::Medium, || async move {
                this.build(user_id).await
            })
            .await
    }

    async fn build(&self, user_id: Uuid) -> AppResult<Dashboard> {
        let (trips, parcels, counts, wallet, held, disputes) = tokio::try_join!(
            self.trip_repo.count_open_by_traveler(user_id),
            self.parcel_repo.count_open_by_sender(user_id),
            self.match_repo.count_by_status_for_user(user_id),
            self.wallet_repo.get_or_create(user_id),
            self.escrow_repo.total_held_as_sender(user_id),
            self.dispute_repo.count_open_for_user(user_id),
        )
        .map_err(AppError::from)?;

        let (matches_by_status, active_matches) = status_breakdown(&counts);

        Ok(Dashboard {
            user_id,
            active_trips: trips,
            open_parcels: parcels,
            matches_by_status,
            active_matches,
            available_balance: wallet.available_balance,
            pending_earnings: wallet.pending_balance,
            escrow_held_as_sender: held,
            open_disputes: disputes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_breakdown() {
        let counts = vec![
            MatchStatusCount {
                status: "pending".to_string(),
                count: 2,
            },
            MatchStatusCount {
                status: "delivered".to_string(),
                count: 4,
            },
            MatchStatusCount {
                status: "in_transit".to_string(),
                count: 1,
            },
        ];
        let (by_status, active) = status_breakdown(&counts);

        assert_eq!(by_status.len(), MatchStatus::ALL.len());
        assert_eq!(by_status["pending"], 2);
        assert_eq!(by_status["cancelled"], 0);
        assert_eq!(active, 3);
    }
}

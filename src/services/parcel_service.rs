use crate::cache::{CacheKeys, CacheService, CacheTtl};
use crate::error::{AppError, AppResult};
use crate::models::{MatchStatus, Parcel, ParcelCategory, ParcelSearch, ParcelStatus};
use crate::pricing::validate_weight;
use crate::repositories::{MatchRepository, NewParcel, ParcelRepository, UserRepository};
use crate::websocket::WebSocketServer;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateParcel {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub weight_kg: Decimal,
    #[serde(default)]
    pub declared_value: Decimal,
    #[serde(default)]
    pub category: Option<ParcelCategory>,
    pub origin_city: String,
    pub origin_country: String,
    pub destination_city: String,
    pub destination_country: String,
    #[serde(default)]
    pub deliver_by: Option<NaiveDate>,
    pub offered_reward: Decimal,
}

pub struct ParcelService {
    parcel_repo: Arc<ParcelRepository>,
    user_repo: Arc<UserRepository>,
    cache: CacheService,
    ws_server: Arc<WebSocketServer>,
    pool: PgPool,
}

fn validate_new_parcel(request: &CreateParcel, today: NaiveDate) -> AppResult<()> {
    let title = request.title.trim();
    if title.is_empty() || title.chars().count() > 200 {
        return Err(AppError::Validation(
            "Title must be between 1 and 200 characters".to_string(),
        ));
    }
    for (name, value) in [
        ("origin_city", &request.origin_city),
        ("origin_country", &request.origin_country),
        ("destination_city", &request.destination_city),
        ("destination_country", &request.destination_country),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{} is required", name)));
        }
    }
    if request.origin_city.trim().eq_ignore_ascii_case(request.destination_city.trim())
        && request
            .origin_country
            .trim()
            .eq_ignore_ascii_case(request.destination_country.trim())
    {
        return Err(AppError::Validation(
            "Origin and destination must differ".to_string(),
        ));
    }

    validate_weight(request.weight_kg)?;

    if request.offered_reward < Decimal::ZERO {
        return Err(AppError::Validation("Reward must not be negative".to_string()));
    }
    if request.declared_value < Decimal::ZERO {
        return Err(AppError::Validation(
            "Declared value must not be negative".to_string(),
        ));
    }
    if matches!(request.deliver_by, Some(by) if by < today) {
        return Err(AppError::Validation(
            "Delivery deadline must not be in the past".to_string(),
        ));
    }
    Ok(())
}

impl ParcelService {
    pub fn new(
        parcel_repo: Arc<ParcelRepository>,
        user_repo: Arc<UserRepository>,
        cache: CacheService,
        ws_server: Arc<WebSocketServer>,
        pool: PgPool,
    ) -> Self {
        Self {
            parcel_repo,
            user_repo,
            cache,
            ws_server,
            pool,
        }
    }

    pub async fn create(&self, sender_id: Uuid, request: CreateParcel) -> AppResult<Parcel> {
        let user = self
            .user_repo
            .find_by_id(sender_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", sender_id)))?;
        if !user.role_enum().can_send() {
            return Err(AppError::Forbidden(
                "Only senders can post parcels".to_string(),
            ));
        }

        validate_new_parcel(&request, Utc::now().date_naive())?;

        let parcel = self
            .parcel_repo
            .create(&NewParcel {
                sender_id,
                title: request.title.trim().to_string(),
                description: request.description,
                weight_kg: request.weight_kg,
                declared_value: request.declared_value,
                category: request.category.unwrap_or(ParcelCategory::Other),
                origin_city: request.origin_city.trim().to_string(),
                origin_country: request.origin_country.trim().to_uppercase(),
                destination_city: request.destination_city.trim().to_string(),
                destination_country: request.destination_country.trim().to_uppercase(),
                deliver_by: request.deliver_by,
                offered_reward: request.offered_reward,
            })
            .await?;

        info!(
            "Parcel {} posted: {} kg {} -> {}",
            parcel.id, parcel.weight_kg, parcel.origin_country, parcel.destination_country
        );
        self.invalidate(&parcel).await;
        Ok(parcel)
    }

    pub async fn get(&self, parcel_id: Uuid) -> AppResult<Parcel> {
        let repo = self.parcel_repo.clone();
        self.cache
            .get_or_set(&CacheKeys::parcel(parcel_id), CacheTtl::Medium, || async move {
                repo.find_by_id(parcel_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Parcel {} not found", parcel_id)))
            })
            .await
    }

    pub async fn search(&self, search: ParcelSearch) -> AppResult<Vec<Parcel>> {
        let search = search.normalized();
        let key = CacheKeys::parcel_search(&search);
        let repo = self.parcel_repo.clone();
        self.cache
            .get_or_set(&key, CacheTtl::Short, || async move {
                Ok::<_, AppError>(repo.search_open(&search).await?)
            })
            .await
    }

    pub async fn list_mine(&self, sender_id: Uuid) -> AppResult<Vec<Parcel>> {
        let repo = self.parcel_repo.clone();
        self.cache
            .get_or_set(&CacheKeys::user_parcels(sender_id), CacheTtl::Short, || async move {
                Ok::<_, AppError>(repo.list_by_sender(sender_id).await?)
            })
            .await
    }

    /// Withdraw an open parcel and decline its pending requests
    pub async fn cancel(&self, sender_id: Uuid, parcel_id: Uuid) -> AppResult<Parcel> {
        let parcel = self
            .parcel_repo
            .find_by_id(parcel_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Parcel {} not found", parcel_id)))?;
        if parcel.sender_id != sender_id {
            return Err(AppError::Forbidden("Parcel belongs to another sender".to_string()));
        }
        if !parcel.is_open() {
            return Err(AppError::Conflict(format!(
                "Only open parcels can be cancelled, parcel is {}",
                parcel.status
            )));
        }

        let mut tx = self.pool.begin().await?;
        let cancelled = ParcelRepository::transition(
            &mut *tx,
            parcel_id,
            &[ParcelStatus::Open],
            ParcelStatus::Cancelled,
        )
        .await?
        .ok_or_else(|| AppError::Conflict("Parcel was matched concurrently".to_string()))?;
        let declined =
            MatchRepository::cancel_pending_for_parcel(&mut *tx, parcel_id, "Parcel cancelled by sender")
                .await?;
        tx.commit().await?;

        for m in &declined {
            self.ws_server
                .broadcast_match_status(m, Some(MatchStatus::Pending.as_str()))
                .await;
            self.cache.delete(&CacheKeys::match_record(m.id)).await;
            self.cache.invalidate_users(&[m.traveler_id]).await;
        }

        info!("Parcel {} cancelled", parcel_id);
        self.invalidate(&cancelled).await;
        Ok(cancelled)
    }

    async fn invalidate(&self, parcel: &Parcel) {
        self.cache.delete(&CacheKeys::parcel(parcel.id)).await;
        self.cache.delete_pattern(CacheKeys::all_parcel_searches()).await;
        self.cache.invalidate_users(&[parcel.sender_id]).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateParcel {
        CreateParcel {
            title: "Birthday gift".to_string(),
            description: None,
            weight_kg: Decimal::new(25, 1),
            declared_value: Decimal::new(120, 0),
            category: Some(ParcelCategory::Clothing),
            origin_city: "Accra".to_string(),
            origin_country: "GH".to_string(),
            destination_city: "Toronto".to_string(),
            destination_country: "CA".to_string(),
            deliver_by: None,
            offered_reward: Decimal::new(40, 0),
        }
    }

    #[test]
    fn test_parcel_rules() {
        let today = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        assert!(validate_new_parcel(&request(), today).is_ok());

        let mut r = request();
        r.weight_kg = Decimal::new(51, 0);
        assert!(validate_new_parcel(&r, today).is_err());

        let mut r = request();
        r.weight_kg = Decimal::ZERO;
        assert!(validate_new_parcel(&r, today).is_err());

        let mut r = request();
        r.offered_reward = Decimal::new(-1, 0);
        assert!(validate_new_parcel(&r, today).is_err());

        let mut r = request();
        r.title = " ".to_string();
        assert!(validate_new_parcel(&r, today).is_err());

        let mut r = request();
        r.deliver_by = NaiveDate::from_ymd_opt(2029, 12, 31);
        assert!(validate_new_parcel(&r, today).is_err());
    }
}

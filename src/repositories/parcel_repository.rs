use crate::error::RepositoryError;
use crate::models::{Parcel, ParcelCategory, ParcelSearch, ParcelStatus};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const PARCEL_COLUMNS: &str = "id, sender_id, title, description, weight_kg, declared_value, \
    category, origin_city, origin_country, destination_city, destination_country, deliver_by, \
    offered_reward, status, created_at, updated_at";

/// Fields for a new parcel
#[derive(Debug, Clone)]
pub struct NewParcel {
    pub sender_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub weight_kg: Decimal,
    pub declared_value: Decimal,
    pub category: ParcelCategory,
    pub origin_city: String,
    pub origin_country: String,
    pub destination_city: String,
    pub destination_country: String,
    pub deliver_by: Option<NaiveDate>,
    pub offered_reward: Decimal,
}

/// Repository for parcel data access
pub struct ParcelRepository {
    pool: PgPool,
}

impl ParcelRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, parcel: &NewParcel) -> Result<Parcel, RepositoryError> {
        let created = sqlx::query_as::<_, Parcel>(&format!(
            r#"
            INSERT INTO parcels
                (sender_id, title, description, weight_kg, declared_value, category,
                 origin_city, origin_country, destination_city, destination_country,
                 deliver_by, offered_reward)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            PARCEL_COLUMNS
        ))
        .bind(parcel.sender_id)
        .bind(&parcel.title)
        .bind(&parcel.description)
        .bind(parcel.weight_kg)
        .bind(parcel.declared_value)
        .bind(parcel.category.as_str())
        .bind(&parcel.origin_city)
        .bind(&parcel.origin_country)
        .bind(&parcel.destination_city)
        .bind(&parcel.destination_country)
        .bind(parcel.deliver_by)
        .bind(parcel.offered_reward)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Parcel>, RepositoryError> {
        let parcel = sqlx::query_as::<_, Parcel>(&format!(
            "SELECT {} FROM parcels WHERE id = $1",
            PARCEL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(parcel)
    }

    pub async fn list_by_sender(&self, sender_id: Uuid) -> Result<Vec<Parcel>, RepositoryError> {
        let parcels = sqlx::query_as::<_, Parcel>(&format!(
            "SELECT {} FROM parcels WHERE sender_id = $1 ORDER BY created_at DESC",
            PARCEL_COLUMNS
        ))
        .bind(sender_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(parcels)
    }

    /// Open parcels matching the filters, best paying first
    pub async fn search_open(&self, search: &ParcelSearch) -> Result<Vec<Parcel>, RepositoryError> {
        let search = search.normalized();
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM parcels WHERE status = 'open' \
             AND (deliver_by IS NULL OR deliver_by >= CURRENT_DATE)",
            PARCEL_COLUMNS
        ));

        if let Some(country) = search.origin_country {
            qb.push(" AND LOWER(origin_country) = ").push_bind(country);
        }
        if let Some(country) = search.destination_country {
            qb.push(" AND LOWER(destination_country) = ").push_bind(country);
        }
        if let Some(weight) = search.max_weight_kg {
            qb.push(" AND weight_kg <= ").push_bind(weight);
        }
        if let Some(reward) = search.min_reward {
            qb.push(" AND offered_reward >= ").push_bind(reward);
        }
        if let Some(category) = search.category {
            qb.push(" AND category = ").push_bind(category);
        }

        qb.push(" ORDER BY offered_reward DESC, created_at DESC LIMIT ")
            .push_bind(search.limit.unwrap_or(ParcelSearch::DEFAULT_LIMIT));
        qb.push(" OFFSET ").push_bind(search.offset.unwrap_or(0));

        let parcels = qb.build_query_as::<Parcel>().fetch_all(&self.pool).await?;
        Ok(parcels)
    }

    /// Compare-and-set status change inside a transaction
    pub async fn transition(
        conn: &mut PgConnection,
        id: Uuid,
        from: &[ParcelStatus],
        to: ParcelStatus,
    ) -> Result<Option<Parcel>, RepositoryError> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let parcel = sqlx::query_as::<_, Parcel>(&format!(
            r#"
            UPDATE parcels
            SET status = $3, updated_at = NOW() AT TIME ZONE 'utc'
            WHERE id = $1 AND status = ANY($2)
            RETURNING {}
            "#,
            PARCEL_COLUMNS
        ))
        .bind(id)
        .bind(&from)
        .bind(to.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        Ok(parcel)
    }

    /// Pool-backed variant of [`ParcelRepository::transition`]
    pub async fn update_status(
        &self,
        id: Uuid,
        from: &[ParcelStatus],
        to: ParcelStatus,
    ) -> Result<Option<Parcel>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Self::transition(&mut conn, id, from, to).await
    }

    pub async fn count_open_by_sender(&self, sender_id: Uuid) -> Result<i64, RepositoryError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM parcels WHERE sender_id = $1 AND status = 'open'")
                .bind(sender_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

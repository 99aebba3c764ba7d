use crate::error::RepositoryError;
use crate::models::{Trip, TripSearch, TripSort, TripStatus};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const TRIP_COLUMNS: &str = "id, traveler_id, origin_city, origin_country, destination_city, \
    destination_country, departure_date, arrival_date, capacity_kg, remaining_kg, price_per_kg, \
    status, notes, created_at, updated_at";

/// Fields for a new trip
#[derive(Debug, Clone)]
pub struct NewTrip {
    pub traveler_id: Uuid,
    pub origin_city: String,
    pub origin_country: String,
    pub destination_city: String,
    pub destination_country: String,
    pub departure_date: NaiveDate,
    pub arrival_date: Option<NaiveDate>,
    pub capacity_kg: Decimal,
    pub price_per_kg: Decimal,
    pub notes: Option<String>,
}

/// Editable trip fields; `None` keeps the current value
#[derive(Debug, Clone, Default)]
pub struct TripChanges {
    pub departure_date: Option<NaiveDate>,
    pub arrival_date: Option<NaiveDate>,
    pub price_per_kg: Option<Decimal>,
    pub notes: Option<String>,
}

/// Repository for trip data access
pub struct TripRepository {
    pool: PgPool,
}

impl TripRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new trip with all capacity available
    pub async fn create(&self, trip: &NewTrip) -> Result<Trip, RepositoryError> {
        let created = sqlx::query_as::<_, Trip>(&format!(
            r#"
            INSERT INTO trips
                (traveler_id, origin_city, origin_country, destination_city, destination_country,
                 departure_date, arrival_date, capacity_kg, remaining_kg, price_per_kg, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $9, $10)
            RETURNING {}
            "#,
            TRIP_COLUMNS
        ))
        .bind(trip.traveler_id)
        .bind(&trip.origin_city)
        .bind(&trip.origin_country)
        .bind(&trip.destination_city)
        .bind(&trip.destination_country)
        .bind(trip.departure_date)
        .bind(trip.arrival_date)
        .bind(trip.capacity_kg)
        .bind(trip.price_per_kg)
        .bind(&trip.notes)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Trip>, RepositoryError> {
        let trip = sqlx::query_as::<_, Trip>(&format!(
            "SELECT {} FROM trips WHERE id = $1",
            TRIP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(trip)
    }

    /// Lock a trip row inside a transaction
    pub async fn find_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Trip, RepositoryError> {
        let trip = sqlx::query_as::<_, Trip>(&format!(
            "SELECT {} FROM trips WHERE id = $1 FOR UPDATE",
            TRIP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Trip {} not found", id)))?;

        Ok(trip)
    }

    /// All trips of a traveler, newest departure first
    pub async fn list_by_traveler(&self, traveler_id: Uuid) -> Result<Vec<Trip>, RepositoryError> {
        let trips = sqlx::query_as::<_, Trip>(&format!(
            "SELECT {} FROM trips WHERE traveler_id = $1 ORDER BY departure_date DESC, created_at DESC",
            TRIP_COLUMNS
        ))
        .bind(traveler_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(trips)
    }

    /// Marketplace search over active trips that have not departed yet
    pub async fn search(&self, search: &TripSearch) -> Result<Vec<Trip>, RepositoryError> {
        let search = search.normalized();
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM trips WHERE status = 'active' AND departure_date >= CURRENT_DATE",
            TRIP_COLUMNS
        ));

        if let Some(country) = search.origin_country {
            qb.push(" AND LOWER(origin_country) = ").push_bind(country);
        }
        if let Some(city) = search.origin_city {
            qb.push(" AND LOWER(origin_city) = ").push_bind(city);
        }
        if let Some(country) = search.destination_country {
            qb.push(" AND LOWER(destination_country) = ").push_bind(country);
        }
        if let Some(city) = search.destination_city {
            qb.push(" AND LOWER(destination_city) = ").push_bind(city);
        }
        if let Some(from) = search.departure_from {
            qb.push(" AND departure_date >= ").push_bind(from);
        }
        if let Some(to) = search.departure_to {
            qb.push(" AND departure_date <= ").push_bind(to);
        }
        if let Some(weight) = search.min_weight_kg {
            qb.push(" AND remaining_kg >= ").push_bind(weight);
        }
        if let Some(price) = search.max_price_per_kg {
            qb.push(" AND price_per_kg <= ").push_bind(price);
        }

        let sort = search.sort.unwrap_or(TripSort::DepartureAsc);
        qb.push(" ORDER BY ").push(sort.order_by());
        qb.push(" LIMIT ")
            .push_bind(search.limit.unwrap_or(TripSearch::DEFAULT_LIMIT));
        qb.push(" OFFSET ").push_bind(search.offset.unwrap_or(0));

        let trips = qb.build_query_as::<Trip>().fetch_all(&self.pool).await?;
        Ok(trips)
    }

    /// Apply edits to a trip that is still open
    pub async fn update_details(
        &self,
        id: Uuid,
        changes: &TripChanges,
    ) -> Result<Option<Trip>, RepositoryError> {
        let trip = sqlx::query_as::<_, Trip>(&format!(
            r#"
            UPDATE trips
            SET departure_date = COALESCE($2, departure_date),
                arrival_date = COALESCE($3, arrival_date),
                price_per_kg = COALESCE($4, price_per_kg),
                notes = COALESCE($5, notes),
                updated_at = NOW() AT TIME ZONE 'utc'
            WHERE id = $1 AND status IN ('active', 'full')
            RETURNING {}
            "#,
            TRIP_COLUMNS
        ))
        .bind(id)
        .bind(changes.departure_date)
        .bind(changes.arrival_date)
        .bind(changes.price_per_kg)
        .bind(&changes.notes)
        .fetch_optional(&self.pool)
        .await?;

        Ok(trip)
    }

    /// Compare-and-set status change inside a transaction.
    /// Returns `None` if the trip was not in `from`.
    pub async fn transition(
        conn: &mut PgConnection,
        id: Uuid,
        from: &[TripStatus],
        to: TripStatus,
    ) -> Result<Option<Trip>, RepositoryError> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let trip = sqlx::query_as::<_, Trip>(&format!(
            r#"
            UPDATE trips
            SET status = $3, updated_at = NOW() AT TIME ZONE 'utc'
            WHERE id = $1 AND status = ANY($2)
            RETURNING {}
            "#,
            TRIP_COLUMNS
        ))
        .bind(id)
        .bind(&from)
        .bind(to.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        Ok(trip)
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        from: &[TripStatus],
        to: TripStatus,
    ) -> Result<Option<Trip>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Self::transition(&mut conn, id, from, to).await
    }

    /// Take `weight_kg` from an active trip. A trip left with no capacity
    /// becomes `full`. Returns `None` when the trip cannot carry the weight.
    pub async fn reserve_capacity(
        conn: &mut PgConnection,
        id: Uuid,
        weight_kg: Decimal,
    ) -> Result<Option<Trip>, RepositoryError> {
        let trip = sqlx::query_as::<_, Trip>(&format!(
            r#"
            UPDATE trips
            SET remaining_kg = remaining_kg - $2,
                status = CASE WHEN remaining_kg - $2 = 0 THEN 'full' ELSE status END,
                updated_at = NOW() AT TIME ZONE 'utc'
            WHERE id = $1 AND status = 'active' AND remaining_kg >= $2
            RETURNING {}
            "#,
            TRIP_COLUMNS
        ))
        .bind(id)
        .bind(weight_kg)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(trip)
    }

    /// Give `weight_kg` back to a trip; a full trip reopens
    pub async fn release_capacity(
        conn: &mut PgConnection,
        id: Uuid,
        weight_kg: Decimal,
    ) -> Result<Trip, RepositoryError> {
        let trip = sqlx::query_as::<_, Trip>(&format!(
            r#"
            UPDATE trips
            SET remaining_kg = LEAST(capacity_kg, remaining_kg + $2),
                status = CASE WHEN status = 'full' THEN 'active' ELSE status END,
                updated_at = NOW() AT TIME ZONE 'utc'
            WHERE id = $1
            RETURNING {}
            "#,
            TRIP_COLUMNS
        ))
        .bind(id)
        .bind(weight_kg)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Trip {} not found", id)))?;

        Ok(trip)
    }

    /// Mark active trips that departed before `today` as expired
    pub async fn expire_departed(&self, today: NaiveDate) -> Result<Vec<Uuid>, RepositoryError> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE trips
            SET status = 'expired', updated_at = NOW() AT TIME ZONE 'utc'
            WHERE status = 'active' AND departure_date < $1
            RETURNING id
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    /// Number of trips of a traveler that are still listed
    pub async fn count_open_by_traveler(&self, traveler_id: Uuid) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM trips WHERE traveler_id = $1 AND status IN ('active', 'full')",
        )
        .bind(traveler_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

use crate::error::RepositoryError;
use crate::models::{KycStatus, User, UserRole};
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for user data access
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new UserRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new user
    pub async fn create(
        &self,
        email: &str,
        full_name: &str,
        phone: Option<&str>,
        role: UserRole,
    ) -> Result<User, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, full_name, phone, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, full_name, phone, role, kyc_status, rating, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(full_name)
        .bind(phone)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find a user by UUID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, full_name, phone, role, kyc_status, rating, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find a user by email (case-insensitive)
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, full_name, phone, role, kyc_status, rating, created_at, updated_at
            FROM users
            WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Update profile fields; `None` keeps the current value
    pub async fn update_profile(
        &self,
        id: Uuid,
        full_name: Option<&str>,
        phone: Option<&str>,
        role: Option<UserRole>,
    ) -> Result<User, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET full_name = COALESCE($2, full_name),
                phone = COALESCE($3, phone),
                role = COALESCE($4, role),
                updated_at = NOW() AT TIME ZONE 'utc'
            WHERE id = $1
            RETURNING id, email, full_name, phone, role, kyc_status, rating, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(full_name)
        .bind(phone)
        .bind(role.map(|r| r.as_str()))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("User {} not found", id)))?;

        Ok(user)
    }

    /// Move KYC status from `from` to `to`. Returns `None` if the user was not in `from`.
    pub async fn update_kyc_status(
        &self,
        id: Uuid,
        from: KycStatus,
        to: KycStatus,
    ) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET kyc_status = $3, updated_at = NOW() AT TIME ZONE 'utc'
            WHERE id = $1 AND kyc_status = $2
            RETURNING id, email, full_name, phone, role, kyc_status, rating, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}

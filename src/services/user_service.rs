use crate::cache::{CacheKeys, CacheService, CacheTtl};
use crate::error::{AppError, AppResult};
use crate::models::{KycStatus, User, UserRole};
use crate::repositories::UserRepository;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUser {
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<UserRole>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfile {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<UserRole>,
}

/// Registration, profile and KYC workflow
pub struct UserService {
    user_repo: Arc<UserRepository>,
    cache: CacheService,
}

fn validate_email(email: &str) -> AppResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if valid && !email.contains(char::is_whitespace) {
        Ok(())
    } else {
        Err(AppError::Validation(format!("Invalid email address: {}", email)))
    }
}

fn validate_name(name: &str) -> AppResult<()> {
    let len = name.trim().chars().count();
    if len == 0 || len > 120 {
        return Err(AppError::Validation(
            "Full name must be between 1 and 120 characters".to_string(),
        ));
    }
    Ok(())
}

impl UserService {
    pub fn new(user_repo: Arc<UserRepository>, cache: CacheService) -> Self {
        Self { user_repo, cache }
    }

    pub async fn register(&self, request: RegisterUser) -> AppResult<User> {
        let email = request.email.trim().to_lowercase();
        validate_email(&email)?;
        validate_name(&request.full_name)?;

        if self.user_repo.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict(format!("Email {} is already registered", email)));
        }

        let user = self
            .user_repo
            .create(
                &email,
                request.full_name.trim(),
                request.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()),
                request.role.unwrap_or(UserRole::Both),
            )
            .await?;

        info!("Registered user {} ({})", user.id, user.role);
        Ok(user)
    }

    /// Cached profile lookup
    pub async fn get(&self, user_id: Uuid) -> AppResult<User> {
        let repo = self.user_repo.clone();
        self.cache
            .get_or_set(&CacheKeys::user(user_id), CacheTtl::Long, || async move {
                repo.find_by_id(user_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
            })
            .await
    }

    pub async fn update_profile(&self, user_id: Uuid, changes: UpdateProfile) -> AppResult<User> {
        if let Some(name) = &changes.full_name {
            validate_name(name)?;
        }

        let user = self
            .user_repo
            .update_profile(
                user_id,
                changes.full_name.as_deref().map(str::trim),
                changes.phone.as_deref().map(str::trim),
                changes.role,
            )
            .await?;

        self.invalidate(user_id).await;
        Ok(user)
    }

    /// Send documents for review
    pub async fn submit_kyc(&self, user_id: Uuid) -> AppResult<User> {
        let user = self.get(user_id).await?;
        self.move_kyc(&user, KycStatus::Pending).await
    }

    /// Admin decision on a pending KYC submission
    pub async fn review_kyc(&self, user_id: Uuid, approve: bool) -> AppResult<User> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        let next = if approve {
            KycStatus::Verified
        } else {
            KycStatus::Rejected
        };
        let updated = self.move_kyc(&user, next).await?;
        info!("KYC for user {} reviewed: {}", user_id, next.as_str());
        Ok(updated)
    }

    async fn move_kyc(&self, user: &User, next: KycStatus) -> AppResult<User> {
        let current = user.kyc_enum();
        if !current.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "KYC cannot move from {} to {}",
                current.as_str(),
                next.as_str()
            )));
        }

        let updated = self
            .user_repo
            .update_kyc_status(user.id, current, next)
            .await?
            .ok_or_else(|| AppError::Conflict("KYC status changed concurrently".to_string()))?;

        self.invalidate(user.id).await;
        Ok(updated)
    }

    async fn invalidate(&self, user_id: Uuid) {
        self.cache.delete(&CacheKeys::user(user_id)).await;
        self.cache.delete(&CacheKeys::user_dashboard(user_id)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ada@example.com").is_ok());
        assert!(validate_email("ada@localhost").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("ada example@x.com").is_err());
        assert!(validate_email("no-at-sign").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Ada Lovelace").is_ok());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(121)).is_err());
    }
}

use crate::error::{AppError, AppResult};
use crate::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const TIMESTAMP_HEADER: &str = "x-auth-timestamp";
pub const SIGNATURE_HEADER: &str = "x-auth-signature";
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Signed requests older (or newer) than this are rejected
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

/// Create the message a client signs for a request
pub fn create_auth_message(user_id: Uuid, timestamp: i64) -> String {
    format!("airbar_auth:{}:{}", user_id, timestamp)
}

/// Hex SHA-256 over `{secret}:{message}`
pub fn sign(secret: &str, user_id: Uuid, timestamp: i64) -> String {
    let payload = format!("{}:{}", secret, create_auth_message(user_id, timestamp));
    hex::encode(Sha256::digest(payload.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Verify a request signature with timestamp.
///
/// Checks that:
/// 1. Timestamp is within five minutes of now
/// 2. Signature matches, or in development is merely present
pub fn verify_auth_with_timestamp(
    secret: &str,
    user_id: Uuid,
    timestamp: i64,
    signature: &str,
    dev_mode: bool,
) -> AppResult<()> {
    let now = chrono::Utc::now().timestamp();
    if (now - timestamp).abs() > MAX_CLOCK_SKEW_SECS {
        return Err(AppError::Unauthorized("Signature timestamp expired".to_string()));
    }

    let signature = signature.trim();
    if signature.is_empty() {
        return Err(AppError::Unauthorized("Signature required".to_string()));
    }
    if dev_mode {
        return Ok(());
    }

    let expected = sign(secret, user_id, timestamp);
    if !constant_time_eq(expected.as_bytes(), signature.to_ascii_lowercase().as_bytes()) {
        return Err(AppError::Unauthorized("Invalid signature".to_string()));
    }
    Ok(())
}

fn header<'a>(parts: &'a Parts, name: &str) -> AppResult<&'a str> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| AppError::Unauthorized(format!("Missing {} header", name)))?
        .to_str()
        .map_err(|_| AppError::Unauthorized(format!("Malformed {} header", name)))
}

/// Caller identity, taken from the signed request headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let user_id = Uuid::parse_str(header(parts, USER_ID_HEADER)?)
            .map_err(|_| AppError::Unauthorized("Invalid user id".to_string()))?;
        let timestamp = header(parts, TIMESTAMP_HEADER)?
            .parse::<i64>()
            .map_err(|_| AppError::Unauthorized("Invalid timestamp".to_string()))?;
        let signature = header(parts, SIGNATURE_HEADER)?;

        verify_auth_with_timestamp(
            &state.config.auth_secret,
            user_id,
            timestamp,
            signature,
            state.config.is_development(),
        )?;

        Ok(AuthUser { user_id })
    }
}

/// An authenticated caller who also presented the admin key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminUser {
    pub user_id: Uuid,
}

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        let key = parts
            .headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if !constant_time_eq(key.as_bytes(), state.config.auth_secret.as_bytes()) {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(AdminUser {
            user_id: user.user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_auth_message() {
        let user = Uuid::new_v4();
        let message = create_auth_message(user, 1_234_567_890);

        assert!(message.starts_with("airbar_auth:"));
        assert!(message.contains(&user.to_string()));
        assert!(message.ends_with(":1234567890"));
    }

    #[test]
    fn test_valid_signature() {
        let user = Uuid::new_v4();
        let now = chrono::Utc::now().timestamp();
        let signature = sign("secret", user, now);

        assert_eq!(signature.len(), 64);
        assert!(verify_auth_with_timestamp("secret", user, now, &signature, false).is_ok());
        assert!(verify_auth_with_timestamp("other", user, now, &signature, false).is_err());
        assert!(verify_auth_with_timestamp("secret", Uuid::new_v4(), now, &signature, false).is_err());
    }

    #[test]
    fn test_verify_auth_with_timestamp_expired() {
        let user = Uuid::new_v4();
        let old_timestamp = chrono::Utc::now().timestamp() - 400;
        let signature = sign("secret", user, old_timestamp);

        let result = verify_auth_with_timestamp("secret", user, old_timestamp, &signature, false);
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_dev_mode_accepts_any_signature() {
        let user = Uuid::new_v4();
        let now = chrono::Utc::now().timestamp();

        assert!(verify_auth_with_timestamp("secret", user, now, "anything", true).is_ok());
        assert!(verify_auth_with_timestamp("secret", user, now, "  ", true).is_err());
        assert!(verify_auth_with_timestamp("secret", user, now, "anything", false).is_err());
    }
}

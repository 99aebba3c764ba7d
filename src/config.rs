use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub test_before_acquire: bool,
}

/// Cache configuration. No `redis_url` means the in-process memory store.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub redis_url: Option<String>,
    pub key_prefix: String,
    pub connect_timeout_ms: u64,
}

/// Price estimation rates
#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub rate_per_kg: Decimal,
    pub rate_per_km: Decimal,
    pub domestic_flat: Decimal,
    pub cross_border_flat: Decimal,
    pub minimum_price: Decimal,
    pub platform_fee_percent: Decimal,
}

/// Escrow and payout settings
#[derive(Debug, Clone)]
pub struct EscrowConfig {
    pub auto_release_hours: i64,
    pub sweep_interval_secs: u64,
    pub min_withdrawal_amount: Decimal,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub pricing: PricingConfig,
    pub escrow: EscrowConfig,
    pub log_level: String,
    pub http_port: u16,
    pub ws_port: Option<u16>,
    pub environment: String,
    pub auth_secret: String,
    pub audit_log_dir: String,
    pub frontend_url: String,
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

fn decimal_env(key: &str, default: Decimal) -> Result<Decimal, String> {
    match env::var(key) {
        Ok(raw) => Decimal::from_str(raw.trim())
            .map_err(|e| format!("Invalid {}: {} ({})", key, raw, e)),
        Err(_) => Ok(default),
    }
}

impl DatabaseConfig {
    /// Create database config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable is required")?;

        let max_connections = parse_env::<u32>("DATABASE_MAX_CONNECTIONS").unwrap_or(10);
        let acquire_timeout_secs = parse_env::<u64>("DATABASE_ACQUIRE_TIMEOUT_SECS").unwrap_or(30);
        let idle_timeout_secs = parse_env::<u64>("DATABASE_IDLE_TIMEOUT_SECS").unwrap_or(600); // 10 minutes
        let max_lifetime_secs = parse_env::<u64>("DATABASE_MAX_LIFETIME_SECS").unwrap_or(1800); // 30 minutes
        let test_before_acquire = parse_env::<bool>("DATABASE_TEST_BEFORE_ACQUIRE").unwrap_or(true);

        if max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
        }

        if acquire_timeout_secs == 0 {
            return Err("DATABASE_ACQUIRE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            url,
            max_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
            test_before_acquire,
        })
    }

    /// Get acquire timeout as Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Get max lifetime as Duration
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/airbar".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            test_before_acquire: true,
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Result<Self, String> {
        let enabled = parse_env::<bool>("CACHE_ENABLED").unwrap_or(true);
        let redis_url = env::var("REDIS_URL").ok().filter(|s| !s.trim().is_empty());
        let key_prefix = env::var("CACHE_KEY_PREFIX").unwrap_or_else(|_| "airbar".to_string());
        let connect_timeout_ms = parse_env::<u64>("REDIS_CONNECT_TIMEOUT_MS").unwrap_or(500);

        if key_prefix.contains('*') || key_prefix.contains(char::is_whitespace) {
            return Err(format!("Invalid CACHE_KEY_PREFIX: {:?}", key_prefix));
        }

        Ok(Self {
            enabled,
            redis_url,
            key_prefix,
            connect_timeout_ms,
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redis_url: None,
            key_prefix: "airbar".to_string(),
            connect_timeout_ms: 500,
        }
    }
}

impl PricingConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        let config = Self {
            rate_per_kg: decimal_env("PRICING_RATE_PER_KG", defaults.rate_per_kg)?,
            rate_per_km: decimal_env("PRICING_RATE_PER_KM", defaults.rate_per_km)?,
            domestic_flat: decimal_env("PRICING_DOMESTIC_FLAT", defaults.domestic_flat)?,
            cross_border_flat: decimal_env("PRICING_CROSS_BORDER_FLAT", defaults.cross_border_flat)?,
            minimum_price: decimal_env("PRICING_MINIMUM_PRICE", defaults.minimum_price)?,
            platform_fee_percent: decimal_env("PLATFORM_FEE_PERCENT", defaults.platform_fee_percent)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        let rates = [
            ("PRICING_RATE_PER_KG", self.rate_per_kg),
            ("PRICING_RATE_PER_KM", self.rate_per_km),
            ("PRICING_DOMESTIC_FLAT", self.domestic_flat),
            ("PRICING_CROSS_BORDER_FLAT", self.cross_border_flat),
            ("PRICING_MINIMUM_PRICE", self.minimum_price),
            ("PLATFORM_FEE_PERCENT", self.platform_fee_percent),
        ];
        for (name, value) in rates {
            if value < Decimal::ZERO {
                return Err(format!("{} must not be negative", name));
            }
        }
        if self.platform_fee_percent >= Decimal::ONE_HUNDRED {
            return Err("PLATFORM_FEE_PERCENT must be below 100".to_string());
        }
        Ok(())
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            rate_per_kg: Decimal::new(800, 2),
            rate_per_km: Decimal::new(1, 2),
            domestic_flat: Decimal::new(500, 2),
            cross_border_flat: Decimal::new(1500, 2),
            minimum_price: Decimal::new(1000, 2),
            platform_fee_percent: Decimal::new(10, 0),
        }
    }
}

impl EscrowConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        let auto_release_hours =
            parse_env::<i64>("ESCROW_AUTO_RELEASE_HOURS").unwrap_or(defaults.auto_release_hours);
        let sweep_interval_secs =
            parse_env::<u64>("SWEEP_INTERVAL_SECS").unwrap_or(defaults.sweep_interval_secs);
        let min_withdrawal_amount =
            decimal_env("MIN_WITHDRAWAL_AMOUNT", defaults.min_withdrawal_amount)?;

        if auto_release_hours <= 0 {
            return Err("ESCROW_AUTO_RELEASE_HOURS must be greater than 0".to_string());
        }
        if sweep_interval_secs == 0 {
            return Err("SWEEP_INTERVAL_SECS must be greater than 0".to_string());
        }
        if min_withdrawal_amount < Decimal::ZERO {
            return Err("MIN_WITHDRAWAL_AMOUNT must not be negative".to_string());
        }

        Ok(Self {
            auto_release_hours,
            sweep_interval_secs,
            min_withdrawal_amount,
        })
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn auto_release_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.auto_release_hours)
    }
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            auto_release_hours: 72,
            sweep_interval_secs: 60,
            min_withdrawal_amount: Decimal::new(2000, 2),
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let database = DatabaseConfig::from_env()?;
        let cache = CacheConfig::from_env()?;
        let pricing = PricingConfig::from_env()?;
        let escrow = EscrowConfig::from_env()?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let http_port = parse_env::<u16>("HTTP_PORT").unwrap_or(8080);
        let ws_port = parse_env::<u16>("WS_PORT");
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let audit_log_dir = env::var("AUDIT_LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&environment.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }
        let environment = environment.to_lowercase();

        let auth_secret = match env::var("AUTH_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ if environment == "development" => "airbar-dev-secret".to_string(),
            _ => return Err("AUTH_SECRET is required outside development".to_string()),
        };

        if ws_port.is_some() && ws_port == Some(http_port) {
            return Err("WS_PORT must differ from HTTP_PORT".to_string());
        }

        Ok(Self {
            database,
            cache,
            pricing,
            escrow,
            log_level: log_level.to_lowercase(),
            http_port,
            ws_port,
            environment,
            auth_secret,
            audit_log_dir,
            frontend_url,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Get database URL (convenience method)
    pub fn database_url(&self) -> &str {
        &self.database.url
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            pricing: PricingConfig::default(),
            escrow: EscrowConfig::default(),
            log_level: "info".to_string(),
            http_port: 8080,
            ws_port: None,
            environment: "development".to_string(),
            auth_secret: "airbar-dev-secret".to_string(),
            audit_log_dir: "./logs".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.acquire_timeout_secs, 30);
    }

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.http_port, 8080);
        assert!(config.is_development());
        assert!(!config.is_production());
        assert!(config.cache.redis_url.is_none());
    }

    #[test]
    fn test_pricing_config_rejects_bad_fee() {
        let mut config = PricingConfig::default();
        assert!(config.validate().is_ok());

        config.platform_fee_percent = Decimal::ONE_HUNDRED;
        assert!(config.validate().is_err());

        config.platform_fee_percent = Decimal::new(10, 0);
        config.rate_per_kg = Decimal::new(-1, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_escrow_window() {
        let config = EscrowConfig::default();
        assert_eq!(config.auto_release_window(), chrono::Duration::hours(72));
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
    }
}

//! Gateway configuration.
//!
//! Loaded from environment variables with defaults suitable for local
//! development. Production deployments must call
//! [`GatewayConfig::validate_for_production`] before serving traffic.

use std::time::Duration;

use cms_auth::{VerifierConfig, MIN_SECRET_LEN};
use cms_core::{GuardConfig, RetryConfig};
use cms_limits::{CacheConfig, RateLimit, RateLimiterConfig};
use thiserror::Error;

use crate::telemetry::LogFormat;

/// Signing secret used when `CMS_JWT_PRIMARY_SECRET` is unset.
///
/// Rejected by [`GatewayConfig::validate_for_production`].
pub const DEVELOPMENT_SECRET: &str = "development-only-signing-secret-do-not-deploy";

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Everything needed to assemble a [`Gateway`](crate::Gateway).
#[derive(Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Current token signing secret.
    pub jwt_primary_secret: String,

    /// Previous signing secret, accepted during rotation.
    pub jwt_secondary_secret: Option<String>,

    /// Expected token issuer.
    pub jwt_issuer: String,

    /// Accepted token audiences.
    pub jwt_audience: Vec<String>,

    /// Clock-skew tolerance in seconds.
    pub jwt_leeway_secs: u64,

    /// Requests allowed per client per window.
    pub rate_limit_max_requests: u32,

    /// Rate-limit window in milliseconds.
    pub rate_limit_window_ms: u64,

    /// Hard cap on tracked rate-limit identifiers.
    pub rate_limit_max_entries: usize,

    /// Interval between background sweeps, in seconds.
    pub sweep_interval_secs: u64,

    /// Verified-token cache TTL in seconds. Zero disables the cache.
    pub token_cache_ttl_secs: u64,

    /// Verified-token cache capacity.
    pub token_cache_max_entries: usize,

    /// PostgreSQL connection string.
    pub database_url: Option<String>,

    /// Per-transaction statement timeout in milliseconds.
    pub statement_timeout_ms: u64,

    /// Attempts allowed for a domain transfer hitting serialization conflicts.
    pub transfer_max_attempts: u32,

    /// Log output format.
    pub log_format: LogFormat,

    /// `meta.source` of emitted domain events.
    pub service_name: String,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("jwt_primary_secret", &"[REDACTED]")
            .field(
                "jwt_secondary_secret",
                &self.jwt_secondary_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_audience", &self.jwt_audience)
            .field("jwt_leeway_secs", &self.jwt_leeway_secs)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("rate_limit_window_ms", &self.rate_limit_window_ms)
            .field("rate_limit_max_entries", &self.rate_limit_max_entries)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .field("token_cache_ttl_secs", &self.token_cache_ttl_secs)
            .field("token_cache_max_entries", &self.token_cache_max_entries)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("statement_timeout_ms", &self.statement_timeout_ms)
            .field("transfer_max_attempts", &self.transfer_max_attempts)
            .field("log_format", &self.log_format)
            .field("service_name", &self.service_name)
            .finish()
    }
}

impl Default for GatewayConfig {
    /// Returns default configuration suitable for local development.
    fn default() -> Self {
        Self {
            jwt_primary_secret: DEVELOPMENT_SECRET.to_string(),
            jwt_secondary_secret: None,
            jwt_issuer: "http://localhost:8080".to_string(),
            jwt_audience: vec!["cms-api".to_string()],
            jwt_leeway_secs: 30,
            rate_limit_max_requests: 100,
            rate_limit_window_ms: 60_000,
            rate_limit_max_entries: 100_000,
            sweep_interval_secs: 300,
            token_cache_ttl_secs: 60,
            token_cache_max_entries: 10_000,
            database_url: None,
            statement_timeout_ms: 30_000,
            transfer_max_attempts: 5,
            log_format: LogFormat::Json,
            service_name: cms_core::DEFAULT_EVENT_SOURCE.to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CMS_JWT_PRIMARY_SECRET`: token signing secret (default: development secret)
    /// - `CMS_JWT_SECONDARY_SECRET`: previous signing secret during rotation
    /// - `CMS_JWT_ISSUER`: expected `iss` (default: http://localhost:8080)
    /// - `CMS_JWT_AUDIENCE`: comma-separated accepted `aud` values (default: cms-api)
    /// - `CMS_JWT_LEEWAY_SECS`: clock-skew tolerance (default: 30)
    /// - `CMS_RATE_LIMIT_MAX_REQUESTS`: requests per window (default: 100)
    /// - `CMS_RATE_LIMIT_WINDOW_MS`: window length (default: 60000)
    /// - `CMS_RATE_LIMIT_MAX_ENTRIES`: tracked identifier cap (default: 100000)
    /// - `CMS_SWEEP_INTERVAL_SECS`: background sweep period (default: 300)
    /// - `CMS_TOKEN_CACHE_TTL_SECS`: verified-token cache TTL, 0 disables (default: 60)
    /// - `CMS_TOKEN_CACHE_MAX_ENTRIES`: verified-token cache capacity (default: 10000)
    /// - `DATABASE_URL`: PostgreSQL connection string
    /// - `CMS_STATEMENT_TIMEOUT_MS`: per-transaction statement timeout (default: 30000)
    /// - `CMS_TRANSFER_MAX_ATTEMPTS`: transfer conflict retries (default: 5)
    /// - `CMS_LOG_FORMAT`: `json` or `pretty` (default: json)
    /// - `CMS_SERVICE_NAME`: event source name (default: cms-core)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            jwt_primary_secret: std::env::var("CMS_JWT_PRIMARY_SECRET")
                .unwrap_or(default.jwt_primary_secret),
            jwt_secondary_secret: std::env::var("CMS_JWT_SECONDARY_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            jwt_issuer: std::env::var("CMS_JWT_ISSUER").unwrap_or(default.jwt_issuer),
            jwt_audience: std::env::var("CMS_JWT_AUDIENCE")
                .map(|s| parse_list(&s))
                .unwrap_or(default.jwt_audience),
            jwt_leeway_secs: env_parse("CMS_JWT_LEEWAY_SECS", default.jwt_leeway_secs),
            rate_limit_max_requests: env_parse(
                "CMS_RATE_LIMIT_MAX_REQUESTS",
                default.rate_limit_max_requests,
            ),
            rate_limit_window_ms: env_parse("CMS_RATE_LIMIT_WINDOW_MS", default.rate_limit_window_ms),
            rate_limit_max_entries: env_parse(
                "CMS_RATE_LIMIT_MAX_ENTRIES",
                default.rate_limit_max_entries,
            ),
            sweep_interval_secs: env_parse("CMS_SWEEP_INTERVAL_SECS", default.sweep_interval_secs),
            token_cache_ttl_secs: env_parse("CMS_TOKEN_CACHE_TTL_SECS", default.token_cache_ttl_secs),
            token_cache_max_entries: env_parse(
                "CMS_TOKEN_CACHE_MAX_ENTRIES",
                default.token_cache_max_entries,
            ),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            statement_timeout_ms: env_parse("CMS_STATEMENT_TIMEOUT_MS", default.statement_timeout_ms),
            transfer_max_attempts: env_parse(
                "CMS_TRANSFER_MAX_ATTEMPTS",
                default.transfer_max_attempts,
            ),
            log_format: std::env::var("CMS_LOG_FORMAT")
                .ok()
                .and_then(|s| LogFormat::parse(&s))
                .unwrap_or(default.log_format),
            service_name: std::env::var("CMS_SERVICE_NAME").unwrap_or(default.service_name),
        }
    }

    /// Validate that the configuration is safe to serve production traffic.
    ///
    /// Rejects the development secret, short secrets, an empty issuer or
    /// audience, zero-sized limits and a missing database.
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        if self.jwt_primary_secret.is_empty() || self.jwt_primary_secret == DEVELOPMENT_SECRET {
            return Err(ConfigError::MissingEnvVar("CMS_JWT_PRIMARY_SECRET".to_string()));
        }
        check_secret("CMS_JWT_PRIMARY_SECRET", &self.jwt_primary_secret)?;
        if let Some(secondary) = &self.jwt_secondary_secret {
            check_secret("CMS_JWT_SECONDARY_SECRET", secondary)?;
            if secondary == &self.jwt_primary_secret {
                return Err(ConfigError::invalid(
                    "CMS_JWT_SECONDARY_SECRET",
                    "must differ from the primary secret",
                ));
            }
        }
        if self.jwt_issuer.trim().is_empty() {
            return Err(ConfigError::invalid("CMS_JWT_ISSUER", "must not be empty"));
        }
        if self.jwt_audience.is_empty() {
            return Err(ConfigError::invalid("CMS_JWT_AUDIENCE", "must name at least one audience"));
        }
        if self.rate_limit_max_requests == 0 {
            return Err(ConfigError::invalid("CMS_RATE_LIMIT_MAX_REQUESTS", "must be positive"));
        }
        if self.rate_limit_window_ms == 0 {
            return Err(ConfigError::invalid("CMS_RATE_LIMIT_WINDOW_MS", "must be positive"));
        }
        if self.rate_limit_max_entries == 0 {
            return Err(ConfigError::invalid("CMS_RATE_LIMIT_MAX_ENTRIES", "must be positive"));
        }
        if self.database_url.is_none() {
            return Err(ConfigError::MissingEnvVar("DATABASE_URL".to_string()));
        }
        Ok(())
    }

    pub fn verifier_config(&self) -> VerifierConfig {
        let mut config = VerifierConfig::new(
            self.jwt_primary_secret.clone(),
            self.jwt_issuer.clone(),
            String::new(),
        )
        .with_leeway(Duration::from_secs(self.jwt_leeway_secs));
        config.audience = self.jwt_audience.clone();
        if let Some(secondary) = &self.jwt_secondary_secret {
            config = config.with_secondary_secret(secondary.clone());
        }
        config
    }

    /// Verified-token cache settings, `None` when disabled.
    pub fn token_cache_config(&self) -> Option<CacheConfig> {
        (self.token_cache_ttl_secs > 0 && self.token_cache_max_entries > 0).then(|| {
            CacheConfig::new(
                self.token_cache_max_entries,
                Duration::from_secs(self.token_cache_ttl_secs),
            )
        })
    }

    pub fn rate_limit(&self) -> RateLimit {
        RateLimit::new(
            self.rate_limit_max_requests,
            Duration::from_millis(self.rate_limit_window_ms),
        )
    }

    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            max_entries: self.rate_limit_max_entries,
            sweep_interval: self.sweep_interval(),
        }
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            retry: RetryConfig::conflict().with_max_attempts(self.transfer_max_attempts),
            statement_timeout: self.statement_timeout(),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn check_secret(key: &str, secret: &str) -> Result<(), ConfigError> {
    if secret.len() < MIN_SECRET_LEN {
        return Err(ConfigError::invalid(
            key,
            format!("must be at least {MIN_SECRET_LEN} bytes"),
        ));
    }
    Ok(())
}

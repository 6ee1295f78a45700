//! Application configuration loaded from environment variables.

use crate::error::{AppError, Result};
use std::env;

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Server bind address (host:port)
    pub bind_address: String,

    /// Log level
    pub log_level: String,

    /// Directory holding uploaded document files
    pub storage_path: String,

    /// Public base URL used when building download links
    pub server_base_url: String,

    /// Secret for signing access tokens
    pub access_token_secret: String,

    /// Secret for signing refresh tokens
    pub refresh_token_secret: String,

    /// Secret for signing download-link tokens
    pub download_token_secret: String,

    /// Access token lifetime in seconds
    pub access_token_expiry_secs: i64,

    /// Refresh token lifetime in seconds
    pub refresh_token_expiry_secs: i64,

    /// Download-link token lifetime in seconds
    pub download_token_expiry_secs: i64,

    /// bcrypt work factor
    pub bcrypt_cost: u32,

    /// Upper bound on an uploaded document, in bytes
    pub max_upload_bytes: usize,

    /// Consult per-document overrides for non-owner, non-admin callers
    pub document_overrides_enabled: bool,
}

redacted_debug!(Config {
    redact database_url,
    show bind_address,
    show log_level,
    show storage_path,
    show server_base_url,
    redact access_token_secret,
    redact refresh_token_secret,
    redact download_token_secret,
    show access_token_expiry_secs,
    show refresh_token_expiry_secs,
    show download_token_expiry_secs,
    show bcrypt_cost,
    show max_upload_bytes,
    show document_overrides_enabled,
});

/// Work factors bcrypt accepts.
const BCRYPT_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AppError::Config(format!("{} not set", key)))
        };
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());

        let bcrypt_cost: u32 = or_default("BCRYPT_COST", "10").parse().unwrap_or(10);
        if !BCRYPT_COST_RANGE.contains(&bcrypt_cost) {
            return Err(AppError::Config(format!(
                "BCRYPT_COST must be between {} and {}, got {}",
                BCRYPT_COST_RANGE.start(),
                BCRYPT_COST_RANGE.end(),
                bcrypt_cost
            )));
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            bind_address: or_default("BIND_ADDRESS", "0.0.0.0:8080"),
            log_level: or_default("LOG_LEVEL", "info"),
            storage_path: or_default("STORAGE_PATH", "./public/uploads"),
            server_base_url: or_default("SERVER_BASE_URL", "http://localhost:8080")
                .trim_end_matches('/')
                .to_string(),
            access_token_secret: required("ACCESS_TOKEN_SECRET")?,
            refresh_token_secret: required("REFRESH_TOKEN_SECRET")?,
            download_token_secret: required("DOWNLOAD_TOKEN_SECRET")?,
            access_token_expiry_secs: or_default("ACCESS_TOKEN_EXPIRY", "86400")
                .parse()
                .unwrap_or(86400),
            refresh_token_expiry_secs: or_default("REFRESH_TOKEN_EXPIRY", "432000")
                .parse()
                .unwrap_or(432000),
            download_token_expiry_secs: or_default("DOWNLOAD_TOKEN_EXPIRY", "300")
                .parse()
                .unwrap_or(300),
            bcrypt_cost,
            max_upload_bytes: or_default("MAX_UPLOAD_BYTES", "52428800")
                .parse()
                .unwrap_or(50 * 1024 * 1024),
            document_overrides_enabled: or_default("DOCUMENT_OVERRIDES_ENABLED", "false")
                .parse()
                .unwrap_or(false),
        })
    }
}

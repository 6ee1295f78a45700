//! Token signing and verification.
//!
//! Three independent HS256 keys sign access, refresh and download-link
//! tokens. Each token carries a `token_type` claim so a token minted for one
//! purpose is rejected by the others even if the secrets were shared.

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::models::role::RoleName;

const ACCESS: &str = "access";
const REFRESH: &str = "refresh";
const DOWNLOAD: &str = "download";

/// Token verification or signing failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("token signing failed: {0}")]
    Encoding(String),
}

/// Access token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    pub username: String,
    pub email: String,
    pub role: RoleName,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub token_type: String,
}

/// Refresh token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    /// Random token id; makes every refresh token unique
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub token_type: String,
}

/// Download-link token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadClaims {
    pub document_id: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub token_type: String,
}

trait TypedClaims {
    fn token_type(&self) -> &str;
}

impl TypedClaims for AccessClaims {
    fn token_type(&self) -> &str {
        &self.token_type
    }
}

impl TypedClaims for RefreshClaims {
    fn token_type(&self) -> &str {
        &self.token_type
    }
}

impl TypedClaims for DownloadClaims {
    fn token_type(&self) -> &str {
        &self.token_type
    }
}

/// A secret paired with the lifetime of the tokens it signs.
#[derive(Clone)]
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl SigningKey {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    fn sign<C: Serialize>(&self, claims: &C) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    fn verify<C>(&self, token: &str, expected_type: &str) -> Result<C, TokenError>
    where
        C: DeserializeOwned + TypedClaims,
    {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<C>(token, &self.decoding, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid(e.to_string()),
        })?;

        if data.claims.token_type() != expected_type {
            return Err(TokenError::Invalid("wrong token type".to_string()));
        }
        Ok(data.claims)
    }
}

/// Signs and verifies the three token kinds.
#[derive(Clone)]
pub struct TokenService {
    access: SigningKey,
    refresh: SigningKey,
    download: SigningKey,
}

impl TokenService {
    pub fn new(access: SigningKey, refresh: SigningKey, download: SigningKey) -> Self {
        Self {
            access,
            refresh,
            download,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            SigningKey::new(&config.access_token_secret, config.access_token_expiry_secs),
            SigningKey::new(&config.refresh_token_secret, config.refresh_token_expiry_secs),
            SigningKey::new(
                &config.download_token_secret,
                config.download_token_expiry_secs,
            ),
        )
    }

    /// Access token lifetime in seconds.
    pub fn access_ttl_secs(&self) -> i64 {
        self.access.ttl_secs
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh.ttl_secs
    }

    pub fn sign_access(
        &self,
        user_id: Uuid,
        username: &str,
        email: &str,
        role: RoleName,
    ) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        self.access.sign(&AccessClaims {
            sub: user_id,
            username: username.to_string(),
            email: email.to_string(),
            role,
            iat: now,
            exp: now + self.access.ttl_secs,
            token_type: ACCESS.to_string(),
        })
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        self.refresh.sign(&RefreshClaims {
            sub: user_id,
            jti: Uuid::new_v4(),
            iat: now,
            exp: now + self.refresh.ttl_secs,
            token_type: REFRESH.to_string(),
        })
    }

    pub fn sign_download(&self, document_id: Uuid) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        self.download.sign(&DownloadClaims {
            document_id,
            iat: now,
            exp: now + self.download.ttl_secs,
            token_type: DOWNLOAD.to_string(),
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.access.verify(token, ACCESS)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.refresh.verify(token, REFRESH)
    }

    pub fn verify_download(&self, token: &str) -> Result<DownloadClaims, TokenError> {
        self.download.verify(token, DOWNLOAD)
    }
}

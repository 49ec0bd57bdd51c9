use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    models::EmployeeId,
    policy::RoleId,
};

/// Claims
///
/// The typed payload carried by every token. Decoding fails as a whole when a
/// field is missing or has the wrong shape, so a `Claims` value that exists is
/// always complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the employee id.
    pub id: EmployeeId,
    /// The employee's role at issuance.
    pub cargo_id: RoleId,
    /// Expiry as a unix timestamp in seconds.
    pub exp: i64,
}

/// TokenError
///
/// Internal reason a token was refused. Callers outside this module only ever
/// see `AppError::Unauthenticated`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("signature or algorithm mismatch")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
}

/// TokenService
///
/// Issues and validates HMAC-signed, time-bounded identity assertions. The keys
/// are derived once from the process-wide secret; the service holds no other
/// state and is safe to share behind an `Arc`.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Only the symmetric MAC family is accepted; anything else in the header is refused.
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.jwt_secret, Duration::hours(config.token_ttl_hours))
    }

    /// issue
    ///
    /// Signs `{id, cargo_id, exp = now + ttl}`.
    pub fn issue(&self, subject_id: EmployeeId, role_id: RoleId) -> AppResult<String> {
        self.issue_at(subject_id, role_id, Utc::now())
    }

    /// Same as `issue`, with an explicit issuance instant.
    pub fn issue_at(
        &self,
        subject_id: EmployeeId,
        role_id: RoleId,
        issued_at: DateTime<Utc>,
    ) -> AppResult<String> {
        let claims = Claims {
            id: subject_id,
            cargo_id: role_id,
            exp: (issued_at + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("failed to sign token: {}", e)))
    }

    /// validate
    ///
    /// Verifies algorithm family, signature and expiry, then returns the typed
    /// claims. Pure with respect to the service: nothing is cached or recorded.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            })
    }
}

use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;

const MIN_SECRET_LEN: usize = 32;
const ACCESS_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub jti: String, // JWT ID (unique per token)
    pub exp: i64,    // Expiration time
    pub iat: i64,    // Issued at
    pub iss: String, // Issuer
}

/// Token-verification collaborator. The routing subsystem never issues
/// credentials; it only turns a presented token into a user identity.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> AppResult<String>;
}

/// HS256 verifier sharing a secret with the token-issuing auth service.
/// Signing is kept for that service's use and for the test suite.
pub struct AuthManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl AuthManager {
    pub fn new(secret: &str, issuer: &str) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            anyhow::bail!(
                "JWT secret must be at least {} characters long",
                MIN_SECRET_LEN
            );
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
        })
    }

    /// Issues a token bound to `user_id`. Returns (token, jti, expiry).
    pub fn create_token(&self, user_id: &str) -> Result<(String, String, i64)> {
        let now = Utc::now();
        let exp = now + Duration::hours(ACCESS_TOKEN_TTL_HOURS);
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: user_id.to_string(),
            jti: jti.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok((token, jti, exp.timestamp()))
    }

    pub fn verify_token(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.clone()]);
        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }
}

impl TokenVerifier for AuthManager {
    fn verify(&self, token: &str) -> AppResult<String> {
        Ok(self.verify_token(token)?.sub)
    }
}

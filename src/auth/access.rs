//! Short-lived access tokens (HS256 JWT).
//!
//! The refresh-token lifecycle never touches these; handlers mint one after a
//! successful login, registration or refresh, and decode one to authenticate
//! bearer requests.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ACCESS_TOKEN_TYPE: &str = "access";

pub trait AccessTokenCodec: Send + Sync {
    /// # Errors
    /// Returns an error if the token cannot be signed.
    fn issue(&self, user_id: Uuid) -> Result<String>;

    /// Returns the subject of a valid, unexpired access token.
    fn decode(&self, token: &str) -> Option<Uuid>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    iat: i64,
    #[serde(rename = "type")]
    kind: String,
}

pub struct JwtCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtCodec {
    #[must_use]
    pub fn new(secret: &SecretString, ttl: Duration) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            ttl,
        }
    }
}

impl AccessTokenCodec for JwtCodec {
    fn issue(&self, user_id: Uuid) -> Result<String> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .context("access token lifetime overflows the calendar")?;
        let claims = Claims {
            sub: user_id.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            kind: ACCESS_TOKEN_TYPE.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("failed to sign access token")
    }

    fn decode(&self, token: &str) -> Option<Uuid> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256)).ok()?;
        if data.claims.kind != ACCESS_TOKEN_TYPE {
            return None;
        }
        Uuid::parse_str(&data.claims.sub).ok()
    }
}

//! Refresh-token issuance, validation, rotation and revocation.
//!
//! A refresh token is two random halves. The *selector* is stored in plain
//! text and indexed; it finds the row. The *validator* is only ever stored
//! as a hash and compared through [`Hasher::verify`]. The client holds
//! `selector.validator` in an `HttpOnly` cookie.
//!
//! Every successful refresh rotates: the presented row is revoked and a new
//! one issued in a single store transaction. A rotated-away cookie that shows
//! up again finds a revoked row, which is reported to the [`ReuseObserver`].
//!
//! All validation failures surface as [`AuthError::Invalid`] with no reason
//! attached.

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{
    clock::{Clock, SystemClock},
    cookie::{decode_cookie_value, encode_cookie_value},
    error::{AuthError, AuthResult},
    hasher::{Hasher, hash_blocking, verify_blocking},
    reuse::{LogReuseObserver, ReuseObserver},
    token::generate_random_token,
};
use crate::storage::{
    InsertOutcome, NewRefreshToken, RefreshToken, RefreshTokenStore, RotateOutcome, TokenState,
    User, UserStore,
};

/// Attempts at drawing a fresh selector when the store reports a collision.
const SELECTOR_ATTEMPTS: usize = 3;

const USER_AGENT_MAX_LEN: usize = 512;
const IP_ADDRESS_MAX_LEN: usize = 64;

/// Optional diagnostic metadata stored with a token. Never used for authorization.
#[derive(Clone, Debug, Default)]
pub struct ClientMetadata {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl ClientMetadata {
    #[must_use]
    pub fn new(user_agent: Option<String>, ip_address: Option<String>) -> Self {
        Self {
            user_agent,
            ip_address,
        }
    }
}

/// A freshly persisted token and the only copy of its cookie value.
#[derive(Debug)]
pub struct IssuedToken {
    pub record: RefreshToken,
    pub cookie_value: SecretString,
}

pub struct RefreshTokens {
    tokens: Arc<dyn RefreshTokenStore>,
    users: Arc<dyn UserStore>,
    hasher: Arc<dyn Hasher>,
    clock: Arc<dyn Clock>,
    reuse: Arc<dyn ReuseObserver>,
}

fn truncate(value: Option<String>, max_chars: usize) -> Option<String> {
    value.map(|value| value.chars().take(max_chars).collect())
}

impl RefreshTokens {
    #[must_use]
    pub fn new(
        tokens: Arc<dyn RefreshTokenStore>,
        users: Arc<dyn UserStore>,
        hasher: Arc<dyn Hasher>,
    ) -> Self {
        Self {
            tokens,
            users,
            hasher,
            clock: Arc::new(SystemClock),
            reuse: Arc::new(LogReuseObserver),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_reuse_observer(mut self, reuse: Arc<dyn ReuseObserver>) -> Self {
        self.reuse = reuse;
        self
    }

    /// Draw selector and validator, hash the validator, and build the row to insert.
    async fn mint(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        ttl: Duration,
        metadata: &ClientMetadata,
    ) -> AuthResult<(NewRefreshToken, SecretString)> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| anyhow!("refresh token lifetime {ttl} overflows the calendar"))?;
        let selector = generate_random_token()?;
        let validator = generate_random_token()?;
        let cookie_value = SecretString::from(encode_cookie_value(&selector, &validator));
        let validator_hash =
            hash_blocking(self.hasher.clone(), SecretString::from(validator)).await?;

        let row = NewRefreshToken {
            user_id,
            selector,
            validator_hash,
            user_agent: truncate(metadata.user_agent.clone(), USER_AGENT_MAX_LEN),
            ip_address: truncate(metadata.ip_address.clone(), IP_ADDRESS_MAX_LEN),
            created_at: now,
            expires_at,
        };
        Ok((row, cookie_value))
    }

    /// Issue a new refresh token for `user_id`.
    ///
    /// The row is durable before this returns; if the caller drops the cookie
    /// value the row simply expires unused.
    ///
    /// # Errors
    /// `AuthError::Fatal` on entropy, hashing or store failure.
    #[instrument(skip(self, metadata))]
    pub async fn issue(
        &self,
        user_id: Uuid,
        ttl: Duration,
        metadata: &ClientMetadata,
    ) -> AuthResult<IssuedToken> {
        let now = self.clock.now();
        for _ in 0..SELECTOR_ATTEMPTS {
            let (row, cookie_value) = self.mint(user_id, now, ttl, metadata).await?;
            match self.tokens.insert(row).await? {
                InsertOutcome::Created(record) => {
                    debug!(token_id = %record.id, "refresh token issued");
                    return Ok(IssuedToken {
                        record,
                        cookie_value,
                    });
                }
                InsertOutcome::Conflict => {}
            }
        }
        Err(AuthError::Fatal(anyhow!(
            "failed to generate a unique refresh token selector"
        )))
    }

    /// Resolve a cookie value to its owner and token row.
    ///
    /// Malformed values are rejected before any store access.
    ///
    /// # Errors
    /// `AuthError::Invalid` for every rejection reason, `AuthError::Fatal` if
    /// the store is unavailable.
    #[instrument(skip_all)]
    pub async fn validate(&self, cookie_value: &str) -> AuthResult<(User, RefreshToken)> {
        let (selector, validator) =
            decode_cookie_value(cookie_value).ok_or(AuthError::Invalid)?;

        let record = self
            .tokens
            .find_by_selector(selector)
            .await?
            .ok_or(AuthError::Invalid)?;

        match record.state_at(self.clock.now()) {
            TokenState::Active => {}
            TokenState::Revoked => {
                self.reuse.revoked_token_presented(&record);
                return Err(AuthError::Invalid);
            }
            TokenState::Expired => return Err(AuthError::Invalid),
        }

        let Some(validator_hash) = record.validator_hash.as_deref() else {
            return Err(AuthError::Invalid);
        };
        let validator_ok = verify_blocking(
            self.hasher.clone(),
            SecretString::from(validator.to_owned()),
            validator_hash.to_string(),
        )
        .await?;
        if !validator_ok {
            return Err(AuthError::Invalid);
        }

        let user = self
            .users
            .find_by_id(record.user_id)
            .await?
            .filter(|user| user.is_active)
            .ok_or(AuthError::Invalid)?;

        Ok((user, record))
    }

    /// Revoke `old` and issue its replacement as one atomic unit.
    ///
    /// If `old` was already revoked (for example by a concurrent rotation that
    /// won) or has expired, nothing is written and the caller gets `Invalid`. If the new row
    /// cannot be persisted, `old` stays active.
    ///
    /// # Errors
    /// `AuthError::Invalid` when `old` is no longer live, `AuthError::Fatal` on
    /// entropy, hashing or store failure.
    #[instrument(skip(self, old, metadata), fields(token_id = %old.id))]
    pub async fn rotate(
        &self,
        old: &RefreshToken,
        ttl: Duration,
        metadata: &ClientMetadata,
    ) -> AuthResult<IssuedToken> {
        let now = self.clock.now();
        for _ in 0..SELECTOR_ATTEMPTS {
            let (row, cookie_value) = self.mint(old.user_id, now, ttl, metadata).await?;
            match self.tokens.rotate(old.id, now, row).await? {
                RotateOutcome::Rotated(record) => {
                    debug!(new_token_id = %record.id, "refresh token rotated");
                    return Ok(IssuedToken {
                        record,
                        cookie_value,
                    });
                }
                RotateOutcome::ParentInactive => {
                    debug!("rotation refused: parent no longer active");
                    return Err(AuthError::Invalid);
                }
                RotateOutcome::SelectorTaken => {}
            }
        }
        Err(AuthError::Fatal(anyhow!(
            "failed to generate a unique refresh token selector"
        )))
    }

    /// Revoke a single token. Revoking an already-revoked token is a no-op.
    ///
    /// # Errors
    /// `AuthError::Fatal` if the store is unavailable.
    #[instrument(skip(self, token), fields(token_id = %token.id))]
    pub async fn revoke_one(&self, token: &RefreshToken) -> AuthResult<()> {
        if token.revoked_at.is_some() {
            return Ok(());
        }
        let revoked = self.tokens.revoke(token.id, self.clock.now()).await?;
        debug!(revoked, "refresh token revoke");
        Ok(())
    }

    /// Revoke every currently active token of `user_id` with one timestamp.
    ///
    /// # Errors
    /// `AuthError::Fatal` if the store is unavailable.
    #[instrument(skip(self))]
    pub async fn revoke_all(&self, user_id: Uuid) -> AuthResult<u64> {
        let revoked = self
            .tokens
            .revoke_all_for_user(user_id, self.clock.now())
            .await?;
        debug!(revoked, "refresh tokens revoked for user");
        Ok(revoked)
    }

    /// All token rows of `user_id`, in creation order.
    ///
    /// # Errors
    /// `AuthError::Fatal` if the store is unavailable.
    pub async fn find_tokens_by_user_id(&self, user_id: Uuid) -> AuthResult<Vec<RefreshToken>> {
        Ok(self.tokens.find_tokens_by_user_id(user_id).await?)
    }
}

//! Persistence for users and refresh tokens.
//!
//! Two traits sit at the seam between the lifecycle and the database:
//! [`UserStore`] and [`RefreshTokenStore`]. [`postgres::PgStore`] is the
//! production implementation; [`memory::MemoryStore`] keeps everything in
//! process and doubles as the test store.
//!
//! Stores never see plaintext secrets. Password and validator hashes arrive
//! already computed, and timestamps are supplied by the caller so a single
//! clock drives expiry decisions.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A registered account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields required to insert a user. `email` must already be normalized.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted refresh token row.
///
/// `selector` and `validator_hash` are `None` only for legacy rows created
/// before the selector/validator scheme.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub selector: Option<String>,
    pub validator_hash: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Derived state of a refresh token at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenState {
    Active,
    Revoked,
    Expired,
}

impl RefreshToken {
    /// Revocation wins over expiry; expiry is never written, only derived.
    #[must_use]
    pub fn state_at(&self, now: DateTime<Utc>) -> TokenState {
        if self.revoked_at.is_some() {
            TokenState::Revoked
        } else if self.expires_at <= now {
            TokenState::Expired
        } else {
            TokenState::Active
        }
    }

    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.state_at(now) == TokenState::Active
    }
}

/// Fields required to insert a refresh token row.
#[derive(Clone, Debug)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub selector: String,
    pub validator_hash: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Result of an insert guarded by a unique constraint.
#[derive(Debug)]
pub enum InsertOutcome<T> {
    Created(T),
    Conflict,
}

/// Result of an atomic revoke-and-replace.
#[derive(Debug)]
pub enum RotateOutcome {
    /// The parent was revoked and the child committed in one unit.
    Rotated(RefreshToken),
    /// The parent was revoked, expired or missing; nothing was written.
    ParentInactive,
    /// The child's selector collided; nothing was written.
    SelectorTaken,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by an already-normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Insert a user; `Conflict` when the normalized email is taken.
    async fn insert(&self, user: NewUser) -> Result<InsertOutcome<User>>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Insert a token row; `Conflict` when the selector is already taken.
    async fn insert(&self, token: NewRefreshToken) -> Result<InsertOutcome<RefreshToken>>;

    /// Fetch a row by selector regardless of its state.
    async fn find_by_selector(&self, selector: &str) -> Result<Option<RefreshToken>>;

    async fn find_tokens_by_user_id(&self, user_id: Uuid) -> Result<Vec<RefreshToken>>;

    /// Set `revoked_at` if still null. Returns `true` when this call revoked the row.
    async fn revoke(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    /// Revoke every row of `user_id` that is active at `now`, stamping all with `now`.
    async fn revoke_all_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64>;

    /// Revoke `old_id` and insert `replacement` as one atomic unit.
    ///
    /// The parent must end up revoked if and only if the child is persisted.
    async fn rotate(
        &self,
        old_id: Uuid,
        now: DateTime<Utc>,
        replacement: NewRefreshToken,
    ) -> Result<RotateOutcome>;

    /// Cheap liveness probe for health checks.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

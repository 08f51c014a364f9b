//! In-process store backed by hash maps.
//!
//! All state sits behind one mutex, so `rotate` is atomic in the same sense
//! as the Postgres transaction. The store also records how many selector
//! lookups it served and can be told to fail inserts, which the lifecycle
//! tests rely on.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    InsertOutcome, NewRefreshToken, NewUser, RefreshToken, RefreshTokenStore, RotateOutcome, User,
    UserStore,
};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    tokens: HashMap<Uuid, RefreshToken>,
    selectors: HashMap<String, Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    selector_lookups: AtomicUsize,
    fail_token_inserts: AtomicBool,
    fail_token_lookups: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `find_by_selector` calls served so far.
    pub fn selector_lookups(&self) -> usize {
        self.selector_lookups.load(Ordering::SeqCst)
    }

    /// Make every subsequent token insert (including the child of a rotation) fail.
    pub fn fail_token_inserts(&self, fail: bool) {
        self.fail_token_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make every `find_by_selector` call fail, as an unreachable database would.
    pub fn fail_token_lookups(&self, fail: bool) {
        self.fail_token_lookups.store(fail, Ordering::SeqCst);
    }

    /// Flip a user's `is_active` flag. Returns `false` if the user is unknown.
    pub async fn set_user_active(&self, id: Uuid, active: bool) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.users.get_mut(&id) {
            Some(user) => {
                user.is_active = active;
                true
            }
            None => false,
        }
    }

    /// Insert a row that predates the selector scheme.
    pub async fn insert_legacy_token(
        &self,
        user_id: Uuid,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> RefreshToken {
        let row = RefreshToken {
            id: Uuid::new_v4(),
            user_id,
            selector: None,
            validator_hash: None,
            user_agent: None,
            ip_address: None,
            created_at,
            expires_at,
            revoked_at: None,
        };
        self.inner.lock().await.tokens.insert(row.id, row.clone());
        row
    }

    fn check_insert_allowed(&self) -> Result<()> {
        if self.fail_token_inserts.load(Ordering::SeqCst) {
            return Err(anyhow!("refresh token insert failed"));
        }
        Ok(())
    }
}

fn same_email(stored: &str, email: &str) -> bool {
    stored.trim().to_lowercase() == email.trim().to_lowercase()
}

fn build_row(token: NewRefreshToken) -> RefreshToken {
    RefreshToken {
        id: Uuid::new_v4(),
        user_id: token.user_id,
        selector: Some(token.selector),
        validator_hash: Some(token.validator_hash),
        user_agent: token.user_agent,
        ip_address: token.ip_address,
        created_at: token.created_at,
        expires_at: token.expires_at,
        revoked_at: None,
    }
}

impl Inner {
    fn store_token(&mut self, row: RefreshToken) {
        if let Some(selector) = &row.selector {
            self.selectors.insert(selector.clone(), row.id);
        }
        self.tokens.insert(row.id, row);
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .find(|user| same_email(&user.email, email))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<InsertOutcome<User>> {
        let mut inner = self.inner.lock().await;
        if inner
            .users
            .values()
            .any(|existing| same_email(&existing.email, &user.email))
        {
            return Ok(InsertOutcome::Conflict);
        }
        let row = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            is_active: true,
            created_at: user.created_at,
        };
        inner.users.insert(row.id, row.clone());
        Ok(InsertOutcome::Created(row))
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn insert(&self, token: NewRefreshToken) -> Result<InsertOutcome<RefreshToken>> {
        self.check_insert_allowed()?;
        let mut inner = self.inner.lock().await;
        if inner.selectors.contains_key(&token.selector) {
            return Ok(InsertOutcome::Conflict);
        }
        let row = build_row(token);
        inner.store_token(row.clone());
        Ok(InsertOutcome::Created(row))
    }

    async fn find_by_selector(&self, selector: &str) -> Result<Option<RefreshToken>> {
        self.selector_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_token_lookups.load(Ordering::SeqCst) {
            return Err(anyhow!("refresh token lookup failed"));
        }
        let inner = self.inner.lock().await;
        Ok(inner
            .selectors
            .get(selector)
            .and_then(|id| inner.tokens.get(id))
            .cloned())
    }

    async fn find_tokens_by_user_id(&self, user_id: Uuid) -> Result<Vec<RefreshToken>> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<RefreshToken> = inner
            .tokens
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.created_at);
        Ok(rows)
    }

    async fn revoke(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.tokens.get_mut(&id) {
            Some(row) if row.revoked_at.is_none() => {
                row.revoked_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let mut revoked = 0;
        for row in inner.tokens.values_mut() {
            if row.user_id == user_id && row.is_active_at(now) {
                row.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn rotate(
        &self,
        old_id: Uuid,
        now: DateTime<Utc>,
        replacement: NewRefreshToken,
    ) -> Result<RotateOutcome> {
        let mut inner = self.inner.lock().await;

        let parent_live = inner
            .tokens
            .get(&old_id)
            .is_some_and(|row| row.is_active_at(now));
        if !parent_live {
            return Ok(RotateOutcome::ParentInactive);
        }
        if inner.selectors.contains_key(&replacement.selector) {
            return Ok(RotateOutcome::SelectorTaken);
        }
        // Child first: a failed insert must leave the parent untouched.
        self.check_insert_allowed()?;
        let child = build_row(replacement);
        inner.store_token(child.clone());

        if let Some(parent) = inner.tokens.get_mut(&old_id) {
            parent.revoked_at = Some(now);
        }
        Ok(RotateOutcome::Rotated(child))
    }
}

//! User registration, lookup and password authentication.

use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{
    clock::Clock,
    error::{AuthError, AuthResult},
    hasher::{Hasher, hash_blocking, verify_blocking},
};
use crate::storage::{InsertOutcome, NewUser, User, UserStore};

/// Upper bound on stored email length.
pub const EMAIL_MAX_LEN: usize = 320;

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct Credentials {
    users: Arc<dyn UserStore>,
    hasher: Arc<dyn Hasher>,
    clock: Arc<dyn Clock>,
    // Verified against when the email is unknown so both paths cost one hash.
    dummy_hash: OnceCell<String>,
}

impl Credentials {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, hasher: Arc<dyn Hasher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            users,
            hasher,
            clock,
            dummy_hash: OnceCell::new(),
        }
    }

    /// # Errors
    /// Returns `AuthError::Fatal` if the store is unavailable.
    pub async fn find_user_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        Ok(self.users.find_by_email(&normalize_email(email)).await?)
    }

    /// # Errors
    /// Returns `AuthError::Fatal` if the store is unavailable.
    pub async fn find_user_by_id(&self, id: Uuid) -> AuthResult<Option<User>> {
        Ok(self.users.find_by_id(id).await?)
    }

    /// Register a new user, storing only the password hash.
    ///
    /// # Errors
    /// `AuthError::Conflict` when the email is already registered, even if
    /// a concurrent registration won the race after the pre-check.
    #[instrument(skip_all)]
    pub async fn create_user(&self, email: &str, password: &str) -> AuthResult<User> {
        let email = normalize_email(email);
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::Conflict);
        }

        let password_hash =
            hash_blocking(self.hasher.clone(), SecretString::from(password.to_owned())).await?;
        let outcome = self
            .users
            .insert(NewUser {
                email,
                password_hash,
                created_at: self.clock.now(),
            })
            .await?;

        match outcome {
            InsertOutcome::Created(user) => {
                debug!(user_id = %user.id, "user registered");
                Ok(user)
            }
            InsertOutcome::Conflict => Err(AuthError::Conflict),
        }
    }

    /// Check an email/password pair.
    ///
    /// Unknown email, inactive account and wrong password are all `Invalid`.
    ///
    /// # Errors
    /// `AuthError::Invalid` on any mismatch, `AuthError::Fatal` on store or hasher failure.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, email: &str, password: &str) -> AuthResult<User> {
        let Some(user) = self.users.find_by_email(&normalize_email(email)).await? else {
            let dummy = self
                .dummy_hash
                .get_or_try_init(|| {
                    hash_blocking(
                        self.hasher.clone(),
                        SecretString::from("tokenward-dummy-password".to_owned()),
                    )
                })
                .await?;
            verify_blocking(
                self.hasher.clone(),
                SecretString::from(password.to_owned()),
                dummy.clone(),
            )
            .await?;
            return Err(AuthError::Invalid);
        };

        let password_ok = verify_blocking(
            self.hasher.clone(),
            SecretString::from(password.to_owned()),
            user.password_hash.clone(),
        )
        .await?;
        if !password_ok || !user.is_active {
            return Err(AuthError::Invalid);
        }
        Ok(user)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::clock::SystemClock;
    use crate::storage::MemoryStore;

    /// Reversible stand-in for a real hash, keeps tests fast.
    pub(crate) struct PlainHasher;

    impl Hasher for PlainHasher {
        fn hash(&self, plaintext: &str) -> anyhow::Result<String> {
            Ok(format!("plain${plaintext}"))
        }

        fn verify(&self, plaintext: &str, hash: &str) -> bool {
            hash.strip_prefix("plain$") == Some(plaintext)
        }
    }

    fn credentials(store: Arc<MemoryStore>) -> Credentials {
        Credentials::new(store, Arc::new(PlainHasher), Arc::new(SystemClock))
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[tokio::test]
    async fn create_user_stores_normalized_email_and_hash() {
        let store = Arc::new(MemoryStore::new());
        let creds = credentials(store);
        let user = creds.create_user(" A@B.com", "p@ss1").await.unwrap();
        assert_eq!(user.email, "a@b.com");
        assert_ne!(user.password_hash, "p@ss1");
        assert!(user.is_active);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let store = Arc::new(MemoryStore::new());
        let creds = credentials(store);
        creds.create_user("a@b.com", "p@ss1").await.unwrap();
        let err = creds.create_user("A@B.COM ", "other").await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict));
    }

    #[tokio::test]
    async fn lookups_ignore_case_and_whitespace() {
        let store = Arc::new(MemoryStore::new());
        let creds = credentials(store);
        let user = creds.create_user("a@b.com", "p@ss1").await.unwrap();
        let found = creds.find_user_by_email("  A@b.COM ").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
        let by_id = creds.find_user_by_id(user.id).await.unwrap();
        assert_eq!(by_id.map(|u| u.email), Some("a@b.com".to_string()));
        assert!(creds.find_user_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn authenticate_collapses_failures() {
        let store = Arc::new(MemoryStore::new());
        let creds = credentials(store.clone());
        let user = creds.create_user("a@b.com", "p@ss1").await.unwrap();

        assert_eq!(
            creds.authenticate("A@B.com", "p@ss1").await.unwrap().id,
            user.id
        );
        assert!(matches!(
            creds.authenticate("a@b.com", "wrong").await,
            Err(AuthError::Invalid)
        ));
        assert!(matches!(
            creds.authenticate("nobody@b.com", "p@ss1").await,
            Err(AuthError::Invalid)
        ));

        store.set_user_active(user.id, false).await;
        assert!(matches!(
            creds.authenticate("a@b.com", "p@ss1").await,
            Err(AuthError::Invalid)
        ));
    }

    /// Records which threads hashing and verification ran on.
    #[derive(Default)]
    struct ThreadRecordingHasher {
        threads: std::sync::Mutex<Vec<std::thread::ThreadId>>,
    }

    impl ThreadRecordingHasher {
        fn record(&self) {
            if let Ok(mut threads) = self.threads.lock() {
                threads.push(std::thread::current().id());
            }
        }
    }

    impl Hasher for ThreadRecordingHasher {
        fn hash(&self, plaintext: &str) -> anyhow::Result<String> {
            self.record();
            PlainHasher.hash(plaintext)
        }

        fn verify(&self, plaintext: &str, hash: &str) -> bool {
            self.record();
            PlainHasher.verify(plaintext, hash)
        }
    }

    #[tokio::test]
    async fn hashing_runs_off_the_runtime_thread() {
        let store = Arc::new(MemoryStore::new());
        let hasher = Arc::new(ThreadRecordingHasher::default());
        let creds = Credentials::new(store, hasher.clone(), Arc::new(SystemClock));

        creds.create_user("a@b.com", "p@ss1").await.unwrap();
        creds.authenticate("a@b.com", "p@ss1").await.unwrap();
        assert!(creds.authenticate("nobody@b.com", "x").await.is_err());
        assert!(creds.authenticate("nobody@b.com", "y").await.is_err());

        let runtime_thread = std::thread::current().id();
        let threads = hasher.threads.lock().unwrap();
        // register hash, login verify, dummy hash once, two dummy verifies
        assert_eq!(threads.len(), 5);
        assert!(threads.iter().all(|id| *id != runtime_thread));
    }
}

//! One-way hashing for passwords and refresh-token validators.

use anyhow::{Context, Result, anyhow};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

/// Salted one-way hash with constant-time verification.
///
/// The same instance is used for passwords and validators.
pub trait Hasher: Send + Sync {
    /// # Errors
    /// Returns an error if the hash cannot be computed.
    fn hash(&self, plaintext: &str) -> Result<String>;

    /// Returns `false` on mismatch and on an unparsable stored hash.
    fn verify(&self, plaintext: &str, hash: &str) -> bool;
}

/// Argon2id producing PHC strings (`$argon2id$v=19$...`).
#[derive(Clone)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    #[must_use]
    pub fn new(params: Params) -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl Hasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| anyhow!("failed to hash secret: {err}"))
    }

    fn verify(&self, plaintext: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.argon2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Run [`Hasher::hash`] on the blocking pool; Argon2 must not stall the runtime.
///
/// # Errors
/// Returns an error if hashing fails or the blocking task panics.
pub async fn hash_blocking(hasher: Arc<dyn Hasher>, plaintext: SecretString) -> Result<String> {
    tokio::task::spawn_blocking(move || hasher.hash(plaintext.expose_secret()))
        .await
        .context("hashing task failed")?
}

/// Run [`Hasher::verify`] on the blocking pool.
///
/// # Errors
/// Returns an error only if the blocking task panics.
pub async fn verify_blocking(
    hasher: Arc<dyn Hasher>,
    plaintext: SecretString,
    hash: String,
) -> Result<bool> {
    tokio::task::spawn_blocking(move || hasher.verify(plaintext.expose_secret(), &hash))
        .await
        .context("verification task failed")
}

//! # Tokenward (refresh-token lifecycle and credential service)
//!
//! `tokenward` issues short-lived access tokens and long-lived, rotating
//! refresh tokens for password-authenticated users.
//!
//! ## Refresh tokens
//!
//! A refresh token is a `selector.validator` pair carried in an `HttpOnly`
//! cookie. The selector is stored in clear and indexed for lookup; the
//! validator is stored only as an Argon2 hash and compared with a
//! constant-time verify. Every refresh revokes the presented token and issues a
//! new one in a single transaction, so a stolen cookie stops working after the
//! legitimate client refreshes once.
//!
//! A revoked token presented again is reported to a [`auth::ReuseObserver`].
//! Tokens are never deleted; expiry is derived from `expires_at` and
//! revocation from `revoked_at`.
//!
//! ## Access tokens
//!
//! Access tokens are HS256 JWTs with `sub`, `iat`, `exp` and `type = "access"`.
//! They are returned in response bodies and sent back as bearer tokens.

pub mod api;
pub mod auth;
pub mod cli;
pub mod storage;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

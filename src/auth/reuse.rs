//! Signal raised when a revoked refresh token is presented again.
//!
//! After a legitimate rotation the parent row is revoked. Seeing its selector
//! again means someone replayed an old cookie, which may indicate theft.
//! The observer only reports; the caller still gets `Invalid`.

use tracing::warn;

use crate::storage::RefreshToken;

pub trait ReuseObserver: Send + Sync {
    fn revoked_token_presented(&self, token: &RefreshToken);
}

#[derive(Clone, Debug, Default)]
pub struct LogReuseObserver;

impl ReuseObserver for LogReuseObserver {
    fn revoked_token_presented(&self, token: &RefreshToken) {
        warn!(
            token_id = %token.id,
            user_id = %token.user_id,
            revoked_at = ?token.revoked_at,
            "revoked refresh token presented; possible token theft"
        );
    }
}

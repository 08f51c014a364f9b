use thiserror::Error;

/// Outcome taxonomy for credential and refresh-token operations.
///
/// `Invalid` deliberately carries no reason: a malformed cookie, an unknown
/// selector, a revoked or expired row, a validator mismatch and an inactive
/// owner are indistinguishable to the caller.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    Invalid,
    #[error("email already registered")]
    Conflict,
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_message_has_no_detail() {
        assert_eq!(AuthError::Invalid.to_string(), "invalid credentials");
    }

    #[test]
    fn fatal_wraps_context() {
        let err = AuthError::from(anyhow::anyhow!("pool timed out"));
        assert!(matches!(err, AuthError::Fatal(_)));
        assert_eq!(err.to_string(), "pool timed out");
    }
}

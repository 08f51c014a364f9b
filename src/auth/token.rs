//! Random material for selectors and validators.

use anyhow::Context;
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{RngCore, rngs::OsRng};

use super::error::AuthResult;

/// Bytes of entropy per generated token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// Generate a URL-safe random token from the OS CSPRNG.
///
/// The alphabet is `A-Z a-z 0-9 - _`, so the value never contains the `.`
/// used as the cookie separator.
///
/// # Errors
/// Returns `AuthError::Fatal` if the entropy source fails.
pub fn generate_random_token() -> AuthResult<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to read from the OS entropy source")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_back_to_32_bytes() {
        let decoded_len = generate_random_token()
            .ok()
            .and_then(|token| Base64UrlUnpadded::decode_vec(&token).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(TOKEN_BYTES));
    }

    #[test]
    fn alphabet_is_url_safe_without_separator() {
        for _ in 0..64 {
            let token = generate_random_token().unwrap_or_default();
            assert_eq!(token.len(), 43);
            assert!(
                token
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
                "unexpected character in {token}"
            );
        }
    }

    #[test]
    fn tokens_differ() {
        let first = generate_random_token().unwrap_or_default();
        let second = generate_random_token().unwrap_or_default();
        assert_ne!(first, second);
    }
}

//! Small helpers shared by the auth handlers.

use axum::{
    Json,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::error;

use super::types::ErrorResponse;
use crate::auth::{AuthError, credentials::EMAIL_MAX_LEN};

static EMAIL_REGEX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    email_normalized.len() <= EMAIL_MAX_LEN
        && EMAIL_REGEX
            .as_ref()
            .is_some_and(|regex| regex.is_match(email_normalized))
}

/// JSON error body in the `{"detail": ...}` shape.
pub(super) fn error_response(status: StatusCode, detail: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            detail: detail.to_string(),
        }),
    )
        .into_response()
}

/// Map a lifecycle error to a response, logging server-side failures.
///
/// `invalid_detail` is the fixed message used for every `Invalid` outcome.
pub(super) fn auth_error_response(err: AuthError, invalid_detail: &str) -> Response {
    match err {
        AuthError::Invalid => error_response(StatusCode::UNAUTHORIZED, invalid_detail),
        AuthError::Conflict => error_response(StatusCode::CONFLICT, "Email already registered"),
        AuthError::Fatal(err) => {
            error!("auth operation failed: {err:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// Read a cookie by name from the `Cookie` header.
pub(super) fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in value.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let Some(key) = parts.next().map(str::trim) else {
            continue;
        };
        let Some(val) = parts.next().map(str::trim) else {
            continue;
        };
        if key == name && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

pub(super) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

pub(super) fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Extract a client IP from common proxy headers.
pub(super) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@b.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts_and_overlong() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-domain@"));
        let long = format!("{}@example.com", "a".repeat(EMAIL_MAX_LEN));
        assert!(!valid_email(&long));
    }

    #[test]
    fn extract_cookie_finds_named_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; refresh_token=S1.V1; other=x"),
        );
        assert_eq!(
            extract_cookie(&headers, "refresh_token"),
            Some("S1.V1".to_string())
        );
        assert_eq!(extract_cookie(&headers, "missing"), None);
    }

    #[test]
    fn extract_cookie_ignores_empty_and_valueless_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("flag; refresh_token="),
        );
        assert_eq!(extract_cookie(&headers, "refresh_token"), None);
        assert_eq!(extract_cookie(&headers, "flag"), None);
    }

    #[test]
    fn extract_bearer_token_handles_case_and_blank() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(extract_bearer_token(&headers), Some("abc".to_string()));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn extract_client_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("1.2.3.4".to_string()));
    }

    #[test]
    fn extract_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("9.9.9.9".to_string()));
        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
    }
}

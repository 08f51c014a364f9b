//! Refresh-cookie endpoints: refresh, logout and logout-all.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{InvalidHeaderValue, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{debug, error};

use super::{
    principal::require_user,
    state::{AuthConfig, AuthState},
    types::{ErrorResponse, LogoutResponse, TokenResponse},
    utils::{
        auth_error_response, error_response, extract_client_ip, extract_cookie,
        extract_user_agent,
    },
};
use crate::auth::{AuthError, ClientMetadata, IssuedToken};
use crate::storage::User;

const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";

#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Refresh token rotated", body = TokenResponse),
        (status = 401, description = "Missing or invalid refresh token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    let Some(cookie_value) = extract_cookie(&headers, auth_state.config().refresh_cookie_name())
    else {
        return error_response(StatusCode::UNAUTHORIZED, "Missing refresh token");
    };

    let lifecycle = auth_state.refresh_tokens();
    let (user, old) = match lifecycle.validate(&cookie_value).await {
        Ok(validated) => validated,
        Err(err) => return auth_error_response(err, INVALID_REFRESH_TOKEN),
    };

    let issued = match lifecycle
        .rotate(
            &old,
            auth_state.config().refresh_token_ttl(),
            &client_metadata(&headers),
        )
        .await
    {
        Ok(issued) => issued,
        Err(err) => return auth_error_response(err, INVALID_REFRESH_TOKEN),
    };

    debug!(user_id = %user.id, token_id = %issued.record.id, "refresh token rotated");
    token_response(&auth_state, &user, &issued)
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Refresh cookie cleared", body = LogoutResponse),
        (status = 500, description = "Token store unavailable; cookie kept", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    if let Some(cookie_value) = extract_cookie(&headers, auth_state.config().refresh_cookie_name())
    {
        let lifecycle = auth_state.refresh_tokens();
        // Unknown or already dead cookies are simply cleared. A store failure keeps
        // the cookie so the client can retry against a live token.
        let revoked = match lifecycle.validate(&cookie_value).await {
            Ok((_, token)) => lifecycle.revoke_one(&token).await,
            Err(AuthError::Invalid) => Ok(()),
            Err(err) => Err(err),
        };
        if let Err(err) = revoked {
            return auth_error_response(err, INVALID_REFRESH_TOKEN);
        }
    }

    cleared_response(
        auth_state.config(),
        LogoutResponse {
            ok: true,
            revoked: None,
        },
    )
}

#[utoipa::path(
    post,
    path = "/auth/logout-all",
    responses(
        (status = 200, description = "Every active refresh token revoked", body = LogoutResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout_all(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    let user = match require_user(&headers, &auth_state).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match auth_state.refresh_tokens().revoke_all(user.id).await {
        Ok(revoked) => cleared_response(
            auth_state.config(),
            LogoutResponse {
                ok: true,
                revoked: Some(revoked),
            },
        ),
        Err(err) => auth_error_response(err, "Not authenticated"),
    }
}

pub(super) fn client_metadata(headers: &HeaderMap) -> ClientMetadata {
    ClientMetadata::new(extract_user_agent(headers), extract_client_ip(headers))
}

/// Access token in the body, refresh token in the cookie.
pub(super) fn token_response(auth_state: &AuthState, user: &User, issued: &IssuedToken) -> Response {
    let access_token = match auth_state.access_tokens().issue(user.id) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to sign access token: {err:#}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    let mut response_headers = HeaderMap::new();
    match refresh_cookie(auth_state.config(), issued.cookie_value.expose_secret()) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build refresh cookie: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    }

    (
        StatusCode::OK,
        response_headers,
        Json(TokenResponse::bearer(access_token)),
    )
        .into_response()
}

fn cleared_response(config: &AuthConfig, body: LogoutResponse) -> Response {
    // Always clear the cookie, even if nothing was revoked.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_refresh_cookie(config) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::OK, response_headers, Json(body)).into_response()
}

/// Build the `HttpOnly` refresh cookie carrying `selector.validator`.
pub(super) fn refresh_cookie(
    config: &AuthConfig,
    value: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    cookie_header(config, value, config.refresh_token_ttl_seconds())
}

pub(super) fn clear_refresh_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    cookie_header(config, "", 0)
}

fn cookie_header(
    config: &AuthConfig,
    value: &str,
    max_age: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{}={value}; Path={}; HttpOnly; SameSite={}; Max-Age={max_age}",
        config.refresh_cookie_name(),
        config.cookie_path(),
        config.cookie_same_site(),
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

//! Bearer access-token authentication for protected endpoints.

use axum::{
    http::{HeaderMap, StatusCode},
    response::Response,
};
use tracing::error;

use super::{
    state::AuthState,
    utils::{error_response, extract_bearer_token},
};
use crate::storage::User;

/// Resolve the bearer token into an active user, or a ready-made 401/500 response.
pub(super) async fn require_user(
    headers: &HeaderMap,
    auth_state: &AuthState,
) -> Result<User, Response> {
    let unauthorized = || error_response(StatusCode::UNAUTHORIZED, "Not authenticated");

    let Some(token) = extract_bearer_token(headers) else {
        return Err(unauthorized());
    };
    let Some(user_id) = auth_state.access_tokens().decode(&token) else {
        return Err(unauthorized());
    };

    match auth_state.credentials().find_user_by_id(user_id).await {
        Ok(Some(user)) if user.is_active => Ok(user),
        Ok(_) => Err(unauthorized()),
        Err(err) => {
            error!("Failed to lookup user for access token: {err}");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
            ))
        }
    }
}

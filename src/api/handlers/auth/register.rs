//! Account registration.

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use std::sync::Arc;
use tracing::info;

use super::{
    session::{client_metadata, token_response},
    state::AuthState,
    types::{CredentialsRequest, ErrorResponse, TokenResponse},
    utils::{auth_error_response, error_response, valid_email},
};
use crate::auth::normalize_email;

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "User registered and signed in", body = TokenResponse),
        (status = 400, description = "Invalid email or password", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
    };

    if !valid_email(&normalize_email(&request.email)) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid email");
    }
    if request.password.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Password is required");
    }

    let user = match auth_state
        .credentials()
        .create_user(&request.email, &request.password)
        .await
    {
        Ok(user) => user,
        Err(err) => return auth_error_response(err, "Invalid credentials"),
    };
    info!(user_id = %user.id, "user registered");

    match auth_state
        .refresh_tokens()
        .issue(
            user.id,
            auth_state.config().refresh_token_ttl(),
            &client_metadata(&headers),
        )
        .await
    {
        Ok(issued) => token_response(&auth_state, &user, &issued),
        Err(err) => auth_error_response(err, "Invalid credentials"),
    }
}

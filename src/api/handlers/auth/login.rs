//! Password login.

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use std::sync::Arc;

use super::{
    session::{client_metadata, token_response},
    state::AuthState,
    types::{CredentialsRequest, ErrorResponse, TokenResponse},
    utils::{auth_error_response, error_response},
};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Signed in", body = TokenResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
    };

    let user = match auth_state
        .credentials()
        .authenticate(&request.email, &request.password)
        .await
    {
        Ok(user) => user,
        Err(err) => return auth_error_response(err, INVALID_CREDENTIALS),
    };

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
        Err(err) => auth_error_response(err, INVALID_CREDENTIALS),
    }
}

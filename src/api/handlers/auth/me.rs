use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::{
    principal::require_user,
    state::AuthState,
    types::{ErrorResponse, MeResponse},
};

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    match require_user(&headers, &auth_state).await {
        Ok(user) => (
            StatusCode::OK,
            Json(MeResponse {
                id: user.id.to_string(),
                email: user.email,
            }),
        )
            .into_response(),
        Err(response) => response,
    }
}

use crate::{
    auth::{AccessTokenCodec, Argon2Hasher},
    storage::PgStore,
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;

pub(crate) mod handlers;
mod openapi;

pub use handlers::auth::{AuthConfig, AuthState, SameSite};
pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Build the full application: documented routes plus request-id, tracing,
/// optional CORS and the shared auth state.
#[must_use]
pub fn app(auth_state: Arc<AuthState>, cors: Option<CorsLayer>) -> Router {
    let (router, _openapi) = router().split_for_parts();
    let router = match cors {
        Some(cors) => router.layer(cors),
        None => router,
    };
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(auth_state)),
    )
}

/// Start the server
/// # Errors
/// Return error if failed to connect to the database or bind the listener
pub async fn new(
    port: u16,
    dsn: String,
    auth_config: AuthConfig,
    access_tokens: Arc<dyn AccessTokenCodec>,
    frontend_origin: Option<String>,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let store = Arc::new(PgStore::new(pool));
    let auth_state = Arc::new(AuthState::from_stores(
        auth_config,
        store.clone(),
        store,
        Arc::new(Argon2Hasher::default()),
        access_tokens,
    ));

    let cors = frontend_origin
        .as_deref()
        .map(cors_layer)
        .transpose()?;
    if cors.is_none() {
        info!("No frontend origin configured, CORS disabled");
    }

    let app = app(auth_state, cors);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

/// Exact-origin CORS with credentials so the browser sends the refresh cookie.
///
/// # Errors
/// Returns an error if the origin is not a valid URL with a host.
pub fn cors_layer(frontend_origin: &str) -> Result<CorsLayer> {
    Ok(CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(origin_header(frontend_origin)?))
        .allow_credentials(true))
}

fn origin_header(frontend_origin: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_origin)
        .with_context(|| format!("Invalid frontend origin: {frontend_origin}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Frontend origin must include a valid host: {frontend_origin}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_header_strips_path_and_keeps_port() {
        let origin = origin_header("http://localhost:5173/app/").unwrap();
        assert_eq!(origin.to_str().unwrap(), "http://localhost:5173");

        let origin = origin_header("https://example.com").unwrap();
        assert_eq!(origin.to_str().unwrap(), "https://example.com");
    }

    #[test]
    fn origin_header_rejects_garbage() {
        assert!(origin_header("not a url").is_err());
        assert!(cors_layer("mailto:someone").is_err());
    }
}

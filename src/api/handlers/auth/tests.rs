//! End-to-end handler tests over the in-memory store.

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use chrono::Duration;
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use super::{AuthConfig, AuthState};
use crate::auth::{JwtCodec, credentials::tests::PlainHasher};
use crate::storage::{MemoryStore, RefreshTokenStore};

struct TestApp {
    store: Arc<MemoryStore>,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(AuthConfig::new())
    }

    fn with_config(config: AuthConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let codec = JwtCodec::new(
            &SecretString::from("test-signing-secret"),
            Duration::minutes(15),
        );
        let state = Arc::new(AuthState::from_stores(
            config,
            store.clone(),
            store.clone(),
            Arc::new(PlainHasher),
            Arc::new(codec),
        ));
        Self {
            store,
            router: crate::api::app(state, None),
        }
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn post_json(&self, path: &str, body: &Value) -> Response<Body> {
        self.send(
            Request::post(path)
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::USER_AGENT, "test-agent/1.0")
                .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn post_with_cookie(&self, path: &str, cookie: Option<&str>) -> Response<Body> {
        let mut request = Request::post(path);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, format!("refresh_token={cookie}"));
        }
        self.send(request.body(Body::empty()).unwrap()).await
    }

    async fn with_bearer(&self, method: &str, path: &str, token: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .method(method)
                .uri(path)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Register and return `(access_token, cookie_value)`.
    async fn register(&self, email: &str, password: &str) -> (String, String) {
        let response = self
            .post_json("/auth/register", &json!({"email": email, "password": password}))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        session_of(response).await
    }

    async fn login(&self, email: &str, password: &str) -> (String, String) {
        let response = self
            .post_json("/auth/login", &json!({"email": email, "password": password}))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        session_of(response).await
    }
}

fn set_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn cookie_value(set_cookie: &str) -> String {
    let pair = set_cookie.split(';').next().unwrap_or_default();
    pair.split_once('=').map(|(_, value)| value.to_string()).unwrap_or_default()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn session_of(response: Response<Body>) -> (String, String) {
    let cookie = cookie_value(&set_cookie(&response));
    let body = json_body(response).await;
    assert_eq!(body["token_type"], "bearer");
    (body["access_token"].as_str().unwrap().to_string(), cookie)
}

#[tokio::test]
async fn register_signs_in_and_me_returns_user() {
    let app = TestApp::new();
    let (access, cookie) = app.register(" Alice@Example.com ", "p@ss1").await;
    assert!(cookie.contains('.'));

    let response = app.with_bearer("GET", "/auth/me", &access).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["email"], "alice@example.com");
    assert!(body["id"].as_str().is_some());
}

#[tokio::test]
async fn register_sets_http_only_cookie() {
    let app = TestApp::new();
    let response = app
        .post_json("/auth/register", &json!({"email": "a@b.com", "password": "p@ss1"}))
        .await;
    let cookie = set_cookie(&response);
    assert!(cookie.starts_with("refresh_token="));
    assert!(cookie.contains("; Path=/; HttpOnly; SameSite=Lax; Max-Age=2592000"));
    assert!(!cookie.contains("Secure"));
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = TestApp::new();
    app.register("a@b.com", "p@ss1").await;

    let response = app
        .post_json("/auth/register", &json!({"email": "A@B.COM", "password": "x"}))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["detail"], "Email already registered");
}

#[tokio::test]
async fn register_rejects_bad_input() {
    let app = TestApp::new();
    for body in [
        json!({"email": "not-an-email", "password": "p@ss1"}),
        json!({"email": "a@b.com", "password": ""}),
        json!({"email": "a@b.com"}),
    ] {
        let response = app.post_json("/auth/register", &body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
    }
}

#[tokio::test]
async fn login_failures_share_one_message() {
    let app = TestApp::new();
    app.register("a@b.com", "p@ss1").await;

    for body in [
        json!({"email": "a@b.com", "password": "wrong"}),
        json!({"email": "nobody@b.com", "password": "p@ss1"}),
    ] {
        let response = app.post_json("/auth/login", &body).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(json_body(response).await["detail"], "Invalid credentials");
    }
}

#[tokio::test]
async fn login_records_client_metadata() {
    let app = TestApp::new();
    let (access, _) = app.register("a@b.com", "p@ss1").await;
    app.login("a@b.com", "p@ss1").await;

    let me = json_body(app.with_bearer("GET", "/auth/me", &access).await).await;
    let user_id = me["id"].as_str().unwrap().parse().unwrap();
    let tokens = app.store.find_tokens_by_user_id(user_id).await.unwrap();
    assert_eq!(tokens.len(), 2);
    for token in tokens {
        assert_eq!(token.user_agent.as_deref(), Some("test-agent/1.0"));
        assert_eq!(token.ip_address.as_deref(), Some("203.0.113.7"));
    }
}

#[tokio::test]
async fn refresh_without_cookie_is_missing() {
    let app = TestApp::new();
    let response = app.post_with_cookie("/auth/refresh", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["detail"], "Missing refresh token");
}

#[tokio::test]
async fn refresh_rotates_and_rejects_replay() {
    let app = TestApp::new();
    let (_, first) = app.register("a@b.com", "p@ss1").await;

    let response = app.post_with_cookie("/auth/refresh", Some(&first)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let (access, second) = session_of(response).await;
    assert_ne!(first, second);
    assert_eq!(
        app.with_bearer("GET", "/auth/me", &access).await.status(),
        StatusCode::OK
    );

    let replay = app.post_with_cookie("/auth/refresh", Some(&first)).await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(replay).await["detail"], "Invalid refresh token");

    let response = app.post_with_cookie("/auth/refresh", Some(&second)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_refresh_cookie_skips_the_store() {
    let app = TestApp::new();
    for cookie in ["no-dot", ".validator", "selector."] {
        let response = app.post_with_cookie("/auth/refresh", Some(cookie)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["detail"], "Invalid refresh token");
    }
    assert_eq!(app.store.selector_lookups(), 0);
}

#[tokio::test]
async fn logout_revokes_and_clears_cookie() {
    let app = TestApp::new();
    let (_, cookie) = app.register("a@b.com", "p@ss1").await;

    let response = app.post_with_cookie("/auth/logout", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response).starts_with("refresh_token=; Path=/;"));
    assert!(set_cookie(&response).contains("Max-Age=0"));
    assert_eq!(json_body(response).await, json!({"ok": true}));

    let response = app.post_with_cookie("/auth/refresh", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_without_or_with_bad_cookie_still_clears() {
    let app = TestApp::new();
    for cookie in [None, Some("garbage"), Some("unknown.selector")] {
        let response = app.post_with_cookie("/auth/logout", cookie).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(set_cookie(&response).contains("Max-Age=0"));
    }
}

#[tokio::test]
async fn logout_reports_store_outage_and_keeps_cookie() {
    let app = TestApp::new();
    let (_, cookie) = app.register("a@b.com", "p@ss1").await;

    app.store.fail_token_lookups(true);
    let response = app.post_with_cookie("/auth/logout", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(json_body(response).await["detail"], "Internal server error");

    // The token was never revoked, so a retry once the store is back succeeds.
    app.store.fail_token_lookups(false);
    let response = app.post_with_cookie("/auth/logout", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.post_with_cookie("/auth/refresh", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_all_revokes_every_session() {
    let app = TestApp::new();
    let (access, first) = app.register("a@b.com", "p@ss1").await;
    let (_, second) = app.login("a@b.com", "p@ss1").await;

    let response = app.with_bearer("POST", "/auth/logout-all", &access).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response).contains("Max-Age=0"));
    assert_eq!(json_body(response).await, json!({"ok": true, "revoked": 2}));

    for cookie in [first, second] {
        let response = app.post_with_cookie("/auth/refresh", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // Nothing active remains.
    let response = app.with_bearer("POST", "/auth/logout-all", &access).await;
    assert_eq!(json_body(response).await["revoked"], 0);
}

#[tokio::test]
async fn protected_routes_require_valid_bearer() {
    let app = TestApp::new();
    let response = app
        .send(Request::get("/auth/me").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.with_bearer("GET", "/auth/me", "not-a-jwt").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.with_bearer("POST", "/auth/logout-all", "not-a-jwt").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn inactive_user_loses_access_and_refresh() {
    let app = TestApp::new();
    let (access, cookie) = app.register("a@b.com", "p@ss1").await;
    let me = json_body(app.with_bearer("GET", "/auth/me", &access).await).await;
    let user_id = me["id"].as_str().unwrap().parse().unwrap();
    assert!(app.store.set_user_active(user_id, false).await);

    let response = app.with_bearer("GET", "/auth/me", &access).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = app.post_with_cookie("/auth/refresh", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn failed_token_insert_is_a_server_error() {
    let app = TestApp::new();
    app.register("a@b.com", "p@ss1").await;
    app.store.fail_token_inserts(true);

    let response = app
        .post_json("/auth/login", &json!({"email": "a@b.com", "password": "p@ss1"}))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn unrepresentable_refresh_lifetime_is_a_server_error() {
    let app = TestApp::with_config(AuthConfig::new().with_refresh_token_ttl_days(200_000_000));
    let response = app
        .post_json("/auth/register", &json!({"email": "a@b.com", "password": "p@ss1"}))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn health_reports_database_and_request_id() {
    let app = TestApp::new();
    let response = app
        .send(
            Request::get("/health")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "req-123"
    );
    assert!(response.headers().get("X-App").is_some());
    let body = json_body(response).await;
    assert_eq!(body["database"], "ok");
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
}

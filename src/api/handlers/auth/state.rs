//! Auth state and refresh-cookie configuration.

use chrono::Duration;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::auth::{AccessTokenCodec, Credentials, Hasher, RefreshTokens};
use crate::storage::{RefreshTokenStore, UserStore};

const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 30;
const DEFAULT_REFRESH_COOKIE_NAME: &str = "refresh_token";
const DEFAULT_COOKIE_PATH: &str = "/";

/// `SameSite` attribute of the refresh cookie.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
}

impl FromStr for SameSite {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "lax" => Ok(Self::Lax),
            "strict" => Ok(Self::Strict),
            "none" => Ok(Self::None),
            other => Err(format!("invalid SameSite policy: {other}")),
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Lax => "Lax",
            Self::Strict => "Strict",
            Self::None => "None",
        };
        f.write_str(value)
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    refresh_token_ttl_days: i64,
    refresh_cookie_name: String,
    cookie_secure: bool,
    cookie_same_site: SameSite,
    cookie_path: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            refresh_token_ttl_days: DEFAULT_REFRESH_TOKEN_TTL_DAYS,
            refresh_cookie_name: DEFAULT_REFRESH_COOKIE_NAME.to_string(),
            cookie_secure: false,
            cookie_same_site: SameSite::default(),
            cookie_path: DEFAULT_COOKIE_PATH.to_string(),
        }
    }

    #[must_use]
    pub fn with_refresh_token_ttl_days(mut self, days: i64) -> Self {
        self.refresh_token_ttl_days = days;
        self
    }

    #[must_use]
    pub fn with_refresh_cookie_name(mut self, name: String) -> Self {
        self.refresh_cookie_name = name;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn with_cookie_same_site(mut self, same_site: SameSite) -> Self {
        self.cookie_same_site = same_site;
        self
    }

    #[must_use]
    pub fn with_cookie_path(mut self, path: String) -> Self {
        self.cookie_path = path;
        self
    }

    /// Saturates for day counts chrono cannot represent; issuing then fails
    /// instead of panicking.
    #[must_use]
    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::try_days(self.refresh_token_ttl_days).unwrap_or(Duration::MAX)
    }

    #[must_use]
    pub fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl().num_seconds()
    }

    #[must_use]
    pub fn refresh_cookie_name(&self) -> &str {
        &self.refresh_cookie_name
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    #[must_use]
    pub fn cookie_same_site(&self) -> SameSite {
        self.cookie_same_site
    }

    #[must_use]
    pub fn cookie_path(&self) -> &str {
        &self.cookie_path
    }
}

/// Everything the auth handlers need, shared behind an `Arc`.
pub struct AuthState {
    config: AuthConfig,
    credentials: Credentials,
    refresh_tokens: RefreshTokens,
    access_tokens: Arc<dyn AccessTokenCodec>,
    token_store: Arc<dyn RefreshTokenStore>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        credentials: Credentials,
        refresh_tokens: RefreshTokens,
        access_tokens: Arc<dyn AccessTokenCodec>,
        token_store: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        Self {
            config,
            credentials,
            refresh_tokens,
            access_tokens,
            token_store,
        }
    }

    /// Wire the default lifecycle and credential service over the given stores.
    #[must_use]
    pub fn from_stores(
        config: AuthConfig,
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn RefreshTokenStore>,
        hasher: Arc<dyn Hasher>,
        access_tokens: Arc<dyn AccessTokenCodec>,
    ) -> Self {
        let credentials = Credentials::new(
            users.clone(),
            hasher.clone(),
            Arc::new(crate::auth::SystemClock),
        );
        let refresh_tokens = RefreshTokens::new(tokens.clone(), users, hasher);
        Self::new(config, credentials, refresh_tokens, access_tokens, tokens)
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    #[must_use]
    pub fn refresh_tokens(&self) -> &RefreshTokens {
        &self.refresh_tokens
    }

    #[must_use]
    pub fn access_tokens(&self) -> &dyn AccessTokenCodec {
        self.access_tokens.as_ref()
    }

    pub(crate) fn token_store(&self) -> &dyn RefreshTokenStore {
        self.token_store.as_ref()
    }
}

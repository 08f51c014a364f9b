use crate::{api, auth::JwtCodec};
use anyhow::{Context, Result};
use chrono::Duration;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: SecretString,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub refresh_cookie_name: String,
    pub cookie_secure: bool,
    pub cookie_same_site: api::SameSite,
    pub cookie_path: String,
    pub frontend_origin: Option<String>,
}

impl Args {
    #[must_use]
    pub fn auth_config(&self) -> api::AuthConfig {
        api::AuthConfig::new()
            .with_refresh_token_ttl_days(self.refresh_token_ttl_days)
            .with_refresh_cookie_name(self.refresh_cookie_name.clone())
            .with_cookie_secure(self.cookie_secure)
            .with_cookie_same_site(self.cookie_same_site)
            .with_cookie_path(self.cookie_path.clone())
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!("Server args: {:?}", args);

    let auth_config = args.auth_config();
    let access_ttl = Duration::try_minutes(args.access_token_ttl_minutes)
        .context("access token lifetime out of range")?;
    let access_tokens = Arc::new(JwtCodec::new(&args.jwt_secret, access_ttl));

    api::new(
        args.port,
        args.dsn,
        auth_config,
        access_tokens,
        args.frontend_origin,
    )
    .await
}

//! Map validated CLI arguments to an action.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::auth;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        jwt_secret: auth_opts.jwt_secret,
        access_token_ttl_minutes: auth_opts.access_token_ttl_minutes,
        refresh_token_ttl_days: auth_opts.refresh_token_ttl_days,
        refresh_cookie_name: auth_opts.refresh_cookie_name,
        cookie_secure: auth_opts.cookie_secure,
        cookie_same_site: auth_opts.cookie_same_site,
        cookie_path: auth_opts.cookie_path,
        frontend_origin: auth_opts.frontend_origin,
    }))
}

use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::api::SameSite;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_ACCESS_TOKEN_TTL_MINUTES: &str = "access-token-ttl-minutes";
pub const ARG_REFRESH_TOKEN_TTL_DAYS: &str = "refresh-token-ttl-days";
pub const ARG_REFRESH_COOKIE_NAME: &str = "refresh-cookie-name";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_COOKIE_SAMESITE: &str = "cookie-samesite";
pub const ARG_COOKIE_PATH: &str = "cookie-path";
pub const ARG_FRONTEND_ORIGIN: &str = "frontend-origin";

/// One week.
pub const MAX_ACCESS_TOKEN_TTL_MINUTES: i64 = 7 * 24 * 60;
/// Ten years.
pub const MAX_REFRESH_TOKEN_TTL_DAYS: i64 = 3650;

/// Validated auth settings pulled out of the matches.
#[derive(Debug)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub refresh_cookie_name: String,
    pub cookie_secure: bool,
    pub cookie_same_site: SameSite,
    pub cookie_path: String,
    pub frontend_origin: Option<String>,
}

impl Options {
    /// # Errors
    /// Returns an error if a required value is missing or empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .filter(|secret| !secret.trim().is_empty())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_JWT_SECRET}"))?;

        Ok(Self {
            jwt_secret: SecretString::from(jwt_secret),
            access_token_ttl_minutes: matches
                .get_one::<i64>(ARG_ACCESS_TOKEN_TTL_MINUTES)
                .copied()
                .unwrap_or(15),
            refresh_token_ttl_days: matches
                .get_one::<i64>(ARG_REFRESH_TOKEN_TTL_DAYS)
                .copied()
                .unwrap_or(30),
            refresh_cookie_name: matches
                .get_one::<String>(ARG_REFRESH_COOKIE_NAME)
                .cloned()
                .unwrap_or_else(|| "refresh_token".to_string()),
            cookie_secure: matches
                .get_one::<bool>(ARG_COOKIE_SECURE)
                .copied()
                .unwrap_or(false),
            cookie_same_site: matches
                .get_one::<SameSite>(ARG_COOKIE_SAMESITE)
                .copied()
                .unwrap_or_default(),
            cookie_path: matches
                .get_one::<String>(ARG_COOKIE_PATH)
                .cloned()
                .unwrap_or_else(|| "/".to_string()),
            frontend_origin: matches.get_one::<String>(ARG_FRONTEND_ORIGIN).cloned(),
        })
    }
}

fn cookie_name_parser(value: &str) -> Result<String, String> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(value.to_string())
    } else {
        Err(format!("invalid cookie name: {value}"))
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    with_cookie_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("Secret used to sign access tokens (HS256)")
                .env("TOKENWARD_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL_MINUTES)
                .long(ARG_ACCESS_TOKEN_TTL_MINUTES)
                .help("Access token lifetime in minutes")
                .env("TOKENWARD_ACCESS_TOKEN_TTL_MIN")
                .default_value("15")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_ACCESS_TOKEN_TTL_MINUTES)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL_DAYS)
                .long(ARG_REFRESH_TOKEN_TTL_DAYS)
                .help("Refresh token lifetime in days")
                .env("TOKENWARD_REFRESH_TOKEN_TTL_DAYS")
                .default_value("30")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_REFRESH_TOKEN_TTL_DAYS)),
        )
}

fn with_cookie_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_REFRESH_COOKIE_NAME)
                .long(ARG_REFRESH_COOKIE_NAME)
                .help("Name of the refresh token cookie")
                .env("TOKENWARD_REFRESH_COOKIE_NAME")
                .default_value("refresh_token")
                .value_parser(cookie_name_parser),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark the refresh cookie Secure (requires HTTPS)")
                .env("TOKENWARD_COOKIE_SECURE")
                .num_args(0..=1)
                .default_value("false")
                .default_missing_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_COOKIE_SAMESITE)
                .long(ARG_COOKIE_SAMESITE)
                .help("SameSite policy of the refresh cookie: lax, strict or none")
                .env("TOKENWARD_COOKIE_SAMESITE")
                .default_value("lax")
                .value_parser(|value: &str| value.parse::<SameSite>()),
        )
        .arg(
            Arg::new(ARG_COOKIE_PATH)
                .long(ARG_COOKIE_PATH)
                .help("Path attribute of the refresh cookie")
                .env("TOKENWARD_COOKIE_PATH")
                .default_value("/"),
        )
        .arg(
            Arg::new(ARG_FRONTEND_ORIGIN)
                .long(ARG_FRONTEND_ORIGIN)
                .help("Browser origin allowed by CORS with credentials; CORS is off when unset")
                .env("TOKENWARD_FRONTEND_ORIGIN"),
        )
}

//! Auth handlers.
//!
//! Login and registration return a short-lived access token in the body and
//! set the refresh token as an `HttpOnly` cookie. `/auth/refresh` rotates the
//! cookie on every use; `/auth/logout` and `/auth/logout-all` revoke one or
//! every active token and always clear the cookie.

pub(crate) mod login;
pub(crate) mod me;
mod principal;
pub(crate) mod register;
pub(crate) mod session;
mod state;
pub(crate) mod types;
mod utils;

pub use state::{AuthConfig, AuthState, SameSite};

#[cfg(test)]
mod tests;

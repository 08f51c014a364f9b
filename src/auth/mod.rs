//! Credential checks and the refresh-token lifecycle.
//!
//! Capabilities that sit outside the core are traits injected at
//! construction: [`Hasher`] (passwords and validators), [`AccessTokenCodec`]
//! (short-lived bearer tokens), [`Clock`] and [`ReuseObserver`].

pub mod access;
pub mod clock;
pub mod cookie;
pub mod credentials;
pub mod error;
pub mod hasher;
pub mod lifecycle;
pub mod reuse;
pub mod token;

pub use access::{AccessTokenCodec, JwtCodec};
pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::{Credentials, normalize_email};
pub use error::{AuthError, AuthResult};
pub use hasher::{Argon2Hasher, Hasher};
pub use lifecycle::{ClientMetadata, IssuedToken, RefreshTokens};
pub use reuse::{LogReuseObserver, ReuseObserver};
pub use token::generate_random_token;

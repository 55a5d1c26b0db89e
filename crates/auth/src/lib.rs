//! Authentication building blocks for the parking service.
//!
//! This crate provides:
//! - Server-side sessions keyed by an opaque cookie identifier
//! - OIDC authorization code flow with PKCE and ID token validation
//! - Storage for in-flight authorization states

mod error;
mod oidc;
mod pkce;
mod session;
mod state_store;

pub use error::*;
pub use oidc::*;
pub use pkce::*;
pub use session::*;
pub use state_store::*;

/// Name of the session cookie.
pub const SESSION_COOKIE_NAME: &str = "parking.sid";

/// Default session lifetime in hours (one week).
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 7;

/// Maximum age of an authorization state before the callback is refused.
pub const AUTH_STATE_MAX_AGE_SECS: i64 = 600;

//! HTTP middleware.

pub mod auth;

pub use self::auth::{CurrentUser, removal_cookie, require_auth, session_cookie};

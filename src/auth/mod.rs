//! Authentication
//!
//! Handles:
//! - Password hashing and one-time secret digests
//! - Session tokens
//! - Request extractors for the acting user

mod middleware;
pub mod password;
pub mod session;

pub use middleware::{CurrentUser, MaybeUser};
pub use password::{hash_password, verify_password};
pub use session::{SESSION_COOKIE, Session, create_session_token, verify_session_token};

//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations
//! - Entity and read models

mod database;
mod models;

pub use database::{Database, MAX_OTP_ATTEMPTS};
pub use models::*;

//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Every operation that acts on behalf of a user takes an explicit [`Actor`].

mod account;
mod engagement;
mod feed;
mod graph;
mod notification;
mod phone;
mod post;

pub use account::{AccountService, PasswordResetIssued, RegisterInput};
pub use engagement::{EngagementService, ToggleOutcome};
pub use feed::{DEFAULT_PAGE_LIMIT, FeedService, MAX_PAGE_LIMIT, PageParams, SUGGEST_LIMIT};
pub use graph::{FollowOutcome, GraphService};
pub use notification::{NotificationService, UnreadSummary};
pub use phone::PhoneVerificationService;
pub use post::{NewPostInput, PostService};

/// The authenticated user performing an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub account_id: String,
    pub profile_id: String,
    pub username: String,
}

/// Uploaded image bytes with their declared MIME type
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Trim and drop empty strings
fn normalize_optional_text(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

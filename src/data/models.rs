//! Data models
//!
//! Rust structs representing database entities and joined read models.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Accounts and profiles
// =============================================================================

/// Login identity
///
/// The password hash never leaves the data and service layers.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub email: String,
    /// Argon2id PHC string
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Social identity wrapping an account (one-to-one)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: String,
    pub account_id: String,
    pub display_name: Option<String>,
    /// One of "M", "F", "O"
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    /// Storage key for the avatar image
    pub avatar_key: Option<String>,
    pub bio: Option<String>,
    /// E.164 phone number
    pub phone_number: Option<String>,
    pub phone_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Gender choices accepted on a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
            Self::Other => "O",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "M" | "m" => Some(Self::Male),
            "F" | "f" => Some(Self::Female),
            "O" | "o" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Partial profile update
///
/// `None` leaves a field untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub display_name: Option<Option<String>>,
    pub gender: Option<Option<Gender>>,
    pub date_of_birth: Option<Option<NaiveDate>>,
    pub bio: Option<Option<String>>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.gender.is_none()
            && self.date_of_birth.is_none()
            && self.bio.is_none()
    }
}

/// Profile with account name and graph counts, as seen by a viewer
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileView {
    pub id: String,
    pub account_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub avatar_key: Option<String>,
    pub bio: Option<String>,
    pub follower_count: i64,
    pub following_count: i64,
    pub followed_by_viewer: bool,
}

/// Compact profile row used by listings
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileCard {
    pub id: String,
    pub account_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_key: Option<String>,
}

// =============================================================================
// Follow graph
// =============================================================================

/// Directed follow edge between two profiles
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FollowEdge {
    pub id: String,
    pub follower_profile_id: String,
    pub target_profile_id: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Posts and engagement
// =============================================================================

/// A short text post with an optional image
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: String,
    pub account_id: String,
    pub title: String,
    /// Storage key for the attached image
    pub image_key: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Post joined with author and engagement counters for one viewer
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostSummary {
    pub id: String,
    pub account_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_key: Option<String>,
    pub title: String,
    pub image_key: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub like_count: i64,
    pub comment_count: i64,
    pub liked: bool,
    pub saved: bool,
    /// Most recent save by the viewer, if any
    pub saved_at: Option<DateTime<Utc>>,
}

/// Comment row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: String,
    pub account_id: String,
    pub post_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Comment joined with its author
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommentView {
    pub id: String,
    pub account_id: String,
    pub username: String,
    pub post_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a create-or-delete edge toggle
#[derive(Debug, Clone)]
pub struct ToggleResult {
    /// Whether the edge exists after the toggle
    pub active: bool,
    /// Edge count on the post after the toggle
    pub count: i64,
    /// Notification emitted by the toggle, if any
    pub notification: Option<Notification>,
}

// =============================================================================
// Notifications
// =============================================================================

/// Engagement event addressed to a profile
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: String,
    pub actor_profile_id: String,
    pub recipient_profile_id: String,
    pub post_id: Option<String>,
    /// Kind: follow, unfollow, like, comment
    pub kind: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Notification kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Follow,
    Unfollow,
    Like,
    Comment,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
            Self::Like => "like",
            Self::Comment => "comment",
        }
    }
}

/// Notification joined with actor name and post title
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationView {
    pub id: String,
    pub kind: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub actor_profile_id: String,
    pub actor_account_id: String,
    pub actor_username: String,
    pub recipient_profile_id: String,
    pub post_id: Option<String>,
    pub post_title: Option<String>,
}

// =============================================================================
// Credential side tables
// =============================================================================

/// One-time phone verification code (hash only)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PhoneOtp {
    pub id: String,
    pub profile_id: String,
    pub phone_number: String,
    pub code_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

/// Password reset token (hash only)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PasswordResetToken {
    pub id: String,
    pub account_id: String,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

/// Input for the registration transaction
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub phone_number: Option<String>,
}

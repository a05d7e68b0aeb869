//! API request and response DTOs
//!
//! JSON bodies exchanged with clients. Storage keys never leave the server;
//! responses carry public media URLs instead.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`)
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// =============================================================================
// Requests
// =============================================================================

/// POST /register
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// POST /login
///
/// `username` also accepts an email address.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /password_reset
#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// POST /password_reset/confirm
#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    pub new_password: String,
}

/// PATCH /profile
///
/// Omitted fields are left alone; `null` clears a field.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub display_name: Option<Option<String>>,
    /// "M", "F" or "O"
    #[serde(default, deserialize_with = "double_option")]
    pub gender: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub date_of_birth: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub bio: Option<Option<String>>,
}

/// POST /posts/:id/comments
#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

/// POST /phone/otp/verify
#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub code: String,
}

/// Query for /search and /suggest
#[derive(Debug, Default, Deserialize)]
pub struct UsernameQuery {
    #[serde(default)]
    pub username: String,
}

// =============================================================================
// Responses
// =============================================================================

/// Account identity returned after register/login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub profile_id: String,
    pub created_at: DateTime<Utc>,
}

/// POST /login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub account: AccountResponse,
}

/// The caller's own profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub id: String,
    pub account_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub phone_number: Option<String>,
    pub phone_verified: bool,
    pub updated_at: DateTime<Utc>,
}

/// Another user's profile as seen by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileViewResponse {
    pub id: String,
    pub account_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub follower_count: i64,
    pub following_count: i64,
    pub followed_by_viewer: bool,
}

/// GET /profiles/:account_id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilePageResponse {
    pub profile: ProfileViewResponse,
    pub posts: Vec<PostResponse>,
}

/// Row of the profile listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileCardResponse {
    pub id: String,
    pub account_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// POST /profiles/:account_id/follow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowResponse {
    pub following: bool,
    pub follower_count: i64,
}

/// PUT /profile/avatar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarResponse {
    pub avatar_url: String,
}

/// Post with author and engagement counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostResponse {
    pub id: String,
    pub account_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub title: String,
    pub image_url: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub like_count: i64,
    pub comment_count: i64,
    pub liked: bool,
    pub saved: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub saved_at: Option<DateTime<Utc>>,
}

/// Comment with its author
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentResponse {
    pub id: String,
    pub account_id: String,
    pub username: String,
    pub post_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Notification addressed to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub id: String,
    /// follow, unfollow, like or comment
    pub kind: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub actor_account_id: String,
    pub actor_username: String,
    pub post_id: Option<String>,
    pub post_title: Option<String>,
}

/// GET /notifications/summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSummaryResponse {
    pub unread_count: i64,
    pub latest: Vec<NotificationResponse>,
}

/// POST /phone/otp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpSentResponse {
    pub expires_in: i64,
}

//! API layer
//!
//! HTTP handlers for:
//! - Accounts, sessions and profiles
//! - Posts, likes, saves and comments
//! - Feeds and user lookup
//! - Notifications and phone verification

mod accounts;
mod converters;
mod dto;
mod feeds;
mod notifications;
mod phone;
mod posts;
mod upload;

pub use converters::*;
pub use dto::*;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::AppState;

/// Create the application router
///
/// Routes are split into public and login-only endpoints. Login-only
/// handlers take `CurrentUser`, which redirects anonymous callers.
pub fn app_router() -> Router<AppState> {
    // Public endpoints (no authentication required)
    let public_routes = Router::new()
        .route("/", get(feeds::home_feed))
        .route("/register", post(accounts::register))
        .route("/login", post(accounts::login))
        .route("/logout", post(accounts::logout))
        .route("/password_reset", post(accounts::request_password_reset))
        .route(
            "/password_reset/confirm",
            post(accounts::confirm_password_reset),
        );

    // Login-only endpoints
    let authenticated_routes = Router::new()
        // Profiles and the follow graph
        .route("/profiles", get(accounts::list_profiles))
        .route("/profiles/:account_id", get(accounts::get_profile_page))
        .route(
            "/profiles/:account_id/follow",
            post(accounts::toggle_follow),
        )
        .route(
            "/profile",
            get(accounts::get_own_profile).patch(accounts::update_profile),
        )
        .route(
            "/profile/avatar",
            put(accounts::update_avatar).delete(accounts::clear_avatar),
        )
        // Posts and engagement
        .route("/posts", post(posts::create_post))
        .route("/posts/:id", axum::routing::delete(posts::delete_post))
        .route("/posts/:id/like", post(posts::toggle_like))
        .route("/posts/:id/save", post(posts::toggle_save))
        .route(
            "/posts/:id/comments",
            get(posts::list_comments).post(posts::add_comment),
        )
        // Feeds and lookup
        .route("/saved", get(feeds::saved_feed))
        .route("/search", get(feeds::search))
        .route("/suggest", get(feeds::suggest))
        // Notifications
        .route("/notifications", get(notifications::list_unread))
        .route("/notifications/summary", get(notifications::unread_summary))
        .route("/notifications/:id/read", post(notifications::mark_read))
        // Phone verification
        .route("/phone/otp", post(phone::send_code))
        .route("/phone/otp/verify", post(phone::verify_code));

    public_routes.merge(authenticated_routes)
}

//! Conversion functions from database models to API DTOs

use crate::api::dto::*;
use crate::data::{
    Account, CommentView, NotificationView, PostSummary, Profile, ProfileCard, ProfileView,
};
use crate::storage::MediaStorage;

fn media_url(storage: &MediaStorage, key: Option<&str>) -> Option<String> {
    key.map(|key| storage.get_public_url(key))
}

/// Convert Account (plus its profile ID) to AccountResponse
pub fn account_to_response(account: &Account, profile_id: &str) -> AccountResponse {
    AccountResponse {
        id: account.id.clone(),
        username: account.username.clone(),
        email: account.email.clone(),
        profile_id: profile_id.to_string(),
        created_at: account.created_at,
    }
}

/// Convert the caller's own Profile to ProfileResponse
pub fn profile_to_response(
    profile: &Profile,
    username: &str,
    storage: &MediaStorage,
) -> ProfileResponse {
    ProfileResponse {
        id: profile.id.clone(),
        account_id: profile.account_id.clone(),
        username: username.to_string(),
        display_name: profile.display_name.clone(),
        gender: profile.gender.clone(),
        date_of_birth: profile.date_of_birth,
        avatar_url: media_url(storage, profile.avatar_key.as_deref()),
        bio: profile.bio.clone(),
        phone_number: profile.phone_number.clone(),
        phone_verified: profile.phone_verified,
        updated_at: profile.updated_at,
    }
}

/// Convert ProfileView to ProfileViewResponse
pub fn profile_view_to_response(view: &ProfileView, storage: &MediaStorage) -> ProfileViewResponse {
    ProfileViewResponse {
        id: view.id.clone(),
        account_id: view.account_id.clone(),
        username: view.username.clone(),
        display_name: view.display_name.clone(),
        gender: view.gender.clone(),
        date_of_birth: view.date_of_birth,
        avatar_url: media_url(storage, view.avatar_key.as_deref()),
        bio: view.bio.clone(),
        follower_count: view.follower_count,
        following_count: view.following_count,
        followed_by_viewer: view.followed_by_viewer,
    }
}

pub fn profile_card_to_response(card: &ProfileCard, storage: &MediaStorage) -> ProfileCardResponse {
    ProfileCardResponse {
        id: card.id.clone(),
        account_id: card.account_id.clone(),
        username: card.username.clone(),
        display_name: card.display_name.clone(),
        avatar_url: media_url(storage, card.avatar_key.as_deref()),
    }
}

/// Convert PostSummary to PostResponse
pub fn post_to_response(post: &PostSummary, storage: &MediaStorage) -> PostResponse {
    PostResponse {
        id: post.id.clone(),
        account_id: post.account_id.clone(),
        username: post.username.clone(),
        display_name: post.display_name.clone(),
        avatar_url: media_url(storage, post.avatar_key.as_deref()),
        title: post.title.clone(),
        image_url: media_url(storage, post.image_key.as_deref()),
        body: post.body.clone(),
        created_at: post.created_at,
        like_count: post.like_count,
        comment_count: post.comment_count,
        liked: post.liked,
        saved: post.saved,
        saved_at: post.saved_at,
    }
}

pub fn posts_to_response(posts: &[PostSummary], storage: &MediaStorage) -> Vec<PostResponse> {
    posts
        .iter()
        .map(|post| post_to_response(post, storage))
        .collect()
}

pub fn comment_to_response(comment: &CommentView) -> CommentResponse {
    CommentResponse {
        id: comment.id.clone(),
        account_id: comment.account_id.clone(),
        username: comment.username.clone(),
        post_id: comment.post_id.clone(),
        body: comment.body.clone(),
        created_at: comment.created_at,
    }
}

pub fn notification_to_response(notification: &NotificationView) -> NotificationResponse {
    NotificationResponse {
        id: notification.id.clone(),
        kind: notification.kind.clone(),
        read: notification.read,
        created_at: notification.created_at,
        actor_account_id: notification.actor_account_id.clone(),
        actor_username: notification.actor_username.clone(),
        post_id: notification.post_id.clone(),
        post_title: notification.post_title.clone(),
    }
}

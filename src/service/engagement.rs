//! Engagement service
//!
//! Likes, saved posts and comments. Like and save are create-or-delete
//! toggles over a unique (account, post) edge.

use std::sync::Arc;

use super::Actor;
use crate::data::{Comment, CommentView, Database, ToggleResult};
use crate::error::AppError;
use crate::metrics::{ENGAGEMENT_EVENTS_TOTAL, NOTIFICATIONS_TOTAL};

/// Longest accepted comment, in characters
pub const MAX_COMMENT_CHARS: usize = 400;

/// Edge state and count after a like/save toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ToggleOutcome {
    /// Whether the edge exists after the toggle
    pub active: bool,
    /// Number of edges on the post after the toggle
    pub count: i64,
}

impl ToggleOutcome {
    fn record(kind: &str, result: &ToggleResult) -> Self {
        let state = if result.active { "on" } else { "off" };
        ENGAGEMENT_EVENTS_TOTAL.with_label_values(&[kind, state]).inc();
        if let Some(notification) = &result.notification {
            NOTIFICATIONS_TOTAL
                .with_label_values(&[notification.kind.as_str()])
                .inc();
        }

        Self {
            active: result.active,
            count: result.count,
        }
    }
}

/// Engagement service
pub struct EngagementService {
    db: Arc<Database>,
}

impl EngagementService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Like the post, or remove the like if it already exists.
    ///
    /// Creating a like notifies the post owner; removing one does not.
    ///
    /// # Errors
    /// `NotFound` if the post does not exist
    pub async fn toggle_like(&self, actor: &Actor, post_id: &str) -> Result<ToggleOutcome, AppError> {
        let result = self
            .db
            .toggle_like(&actor.account_id, &actor.profile_id, post_id)
            .await?;

        tracing::info!(
            account_id = %actor.account_id,
            post_id = %post_id,
            liked = result.active,
            likes = result.count,
            "Like toggled"
        );

        Ok(ToggleOutcome::record("like", &result))
    }

    /// Save the post, or unsave it if already saved. Never notifies.
    ///
    /// # Errors
    /// `NotFound` if the post does not exist
    pub async fn toggle_save(&self, actor: &Actor, post_id: &str) -> Result<ToggleOutcome, AppError> {
        let result = self
            .db
            .toggle_saved_post(&actor.account_id, post_id)
            .await?;

        tracing::info!(
            account_id = %actor.account_id,
            post_id = %post_id,
            saved = result.active,
            "Save toggled"
        );

        Ok(ToggleOutcome::record("save", &result))
    }

    /// Append a comment and notify the post owner (including self-comments).
    ///
    /// # Errors
    /// `Validation` for empty or over-long text, `NotFound` if the post
    /// does not exist
    pub async fn add_comment(
        &self,
        actor: &Actor,
        post_id: &str,
        text: &str,
    ) -> Result<Comment, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("comment cannot be empty".to_string()));
        }
        if text.chars().count() > MAX_COMMENT_CHARS {
            return Err(AppError::Validation(format!(
                "comment must be at most {} characters",
                MAX_COMMENT_CHARS
            )));
        }

        let (comment, notification) = self
            .db
            .insert_comment(&actor.account_id, &actor.profile_id, post_id, text)
            .await?;

        ENGAGEMENT_EVENTS_TOTAL
            .with_label_values(&["comment", "on"])
            .inc();
        NOTIFICATIONS_TOTAL
            .with_label_values(&[notification.kind.as_str()])
            .inc();
        tracing::info!(
            comment_id = %comment.id,
            post_id = %post_id,
            account_id = %actor.account_id,
            "Comment added"
        );

        Ok(comment)
    }

    /// Comments on a post, oldest first
    ///
    /// # Errors
    /// `NotFound` if the post does not exist
    pub async fn list_comments(&self, post_id: &str) -> Result<Vec<CommentView>, AppError> {
        if self.db.get_post(post_id).await?.is_none() {
            return Err(AppError::NotFound);
        }
        self.db.get_comments(post_id).await
    }
}

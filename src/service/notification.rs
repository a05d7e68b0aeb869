//! Notification feed service

use std::sync::Arc;

use super::Actor;
use crate::data::{Database, NotificationView};
use crate::error::AppError;

/// Number of notifications shown in the unread summary
pub const SUMMARY_LATEST: usize = 4;

/// Unread count plus the newest few unread notifications
#[derive(Debug, Clone)]
pub struct UnreadSummary {
    pub unread_count: i64,
    pub latest: Vec<NotificationView>,
}

/// Notification feed service
pub struct NotificationService {
    db: Arc<Database>,
}

impl NotificationService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Unread notifications addressed to the actor, newest first
    pub async fn list_unread(&self, actor: &Actor) -> Result<Vec<NotificationView>, AppError> {
        self.db
            .get_unread_notifications(&actor.profile_id, None)
            .await
    }

    /// Unread count and the latest unread notifications for page chrome
    pub async fn unread_summary(&self, actor: &Actor) -> Result<UnreadSummary, AppError> {
        let unread_count = self
            .db
            .count_unread_notifications(&actor.profile_id)
            .await?;
        let latest = self
            .db
            .get_unread_notifications(&actor.profile_id, Some(SUMMARY_LATEST))
            .await?;

        Ok(UnreadSummary {
            unread_count,
            latest,
        })
    }

    /// Mark a notification as read.
    ///
    /// Idempotent. Any authenticated user may mark any notification.
    ///
    /// # Errors
    /// `NotFound` if the notification does not exist
    pub async fn mark_read(&self, notification_id: &str) -> Result<(), AppError> {
        if !self.db.mark_notification_read(notification_id).await? {
            return Err(AppError::NotFound);
        }

        tracing::debug!(notification_id = %notification_id, "Notification marked as read");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::{create_test_db, post, register};
    use crate::service::{EngagementService, GraphService};

    #[tokio::test]
    async fn unread_feed_is_newest_first_and_shrinks_on_read() {
        let (db, _temp_dir) = create_test_db().await;
        let service = NotificationService::new(db.clone());
        let engagement = EngagementService::new(db.clone());
        let graph = GraphService::new(db.clone());
        let alice = register(&db, "alice").await;
        let bob = register(&db, "bob").await;
        let p = post(&db, &alice, "hello").await;

        graph.toggle_follow(&bob, &alice.account_id).await.unwrap();
        engagement.toggle_like(&bob, &p.id).await.unwrap();
        engagement.add_comment(&bob, &p.id, "nice").await.unwrap();

        let unread = service.list_unread(&alice).await.unwrap();
        let kinds: Vec<&str> = unread.iter().map(|n| n.kind.as_str()).collect();
        assert_eq!(kinds, vec!["comment", "like", "follow"]);
        assert!(unread.iter().all(|n| n.actor_username == "bob"));
        assert_eq!(unread[0].post_title.as_deref(), Some("hello"));
        assert_eq!(unread[2].post_id, None);

        service.mark_read(&unread[0].id).await.unwrap();
        // Idempotent
        service.mark_read(&unread[0].id).await.unwrap();

        let remaining = service.list_unread(&alice).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|n| n.id != unread[0].id));
    }

    #[tokio::test]
    async fn summary_caps_latest_at_four() {
        let (db, _temp_dir) = create_test_db().await;
        let service = NotificationService::new(db.clone());
        let engagement = EngagementService::new(db.clone());
        let alice = register(&db, "alice").await;
        let bob = register(&db, "bob").await;
        let p = post(&db, &alice, "hello").await;

        for i in 0..6 {
            engagement
                .add_comment(&bob, &p.id, &format!("comment {}", i))
                .await
                .unwrap();
        }

        let summary = service.unread_summary(&alice).await.unwrap();
        assert_eq!(summary.unread_count, 6);
        assert_eq!(summary.latest.len(), SUMMARY_LATEST);

        let empty = service.unread_summary(&bob).await.unwrap();
        assert_eq!(empty.unread_count, 0);
        assert!(empty.latest.is_empty());
    }

    #[tokio::test]
    async fn mark_read_has_no_ownership_check_but_requires_existence() {
        let (db, _temp_dir) = create_test_db().await;
        let service = NotificationService::new(db.clone());
        let graph = GraphService::new(db.clone());
        let alice = register(&db, "alice").await;
        let bob = register(&db, "bob").await;

        graph.toggle_follow(&bob, &alice.account_id).await.unwrap();
        let alice_unread = service.list_unread(&alice).await.unwrap();
        assert_eq!(alice_unread.len(), 1);

        // Bob's session marks Alice's notification; the service does not care who asks.
        service.mark_read(&alice_unread[0].id).await.unwrap();
        assert!(service.list_unread(&alice).await.unwrap().is_empty());

        assert!(matches!(
            service.mark_read("missing").await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn notifications_survive_post_deletion() {
        let (db, _temp_dir) = create_test_db().await;
        let service = NotificationService::new(db.clone());
        let engagement = EngagementService::new(db.clone());
        let alice = register(&db, "alice").await;
        let bob = register(&db, "bob").await;
        let p = post(&db, &alice, "hello").await;

        engagement.toggle_like(&bob, &p.id).await.unwrap();
        assert!(db.delete_post(&p.id, &alice.account_id).await.unwrap());

        let unread = service.list_unread(&alice).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].post_id, None);
        assert_eq!(unread[0].post_title, None);
    }
}

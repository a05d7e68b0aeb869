//! Follow graph service

use std::sync::Arc;

use super::Actor;
use crate::data::Database;
use crate::error::AppError;
use crate::metrics::{ENGAGEMENT_EVENTS_TOTAL, NOTIFICATIONS_TOTAL};

/// Edge state after a follow toggle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowOutcome {
    /// Whether the actor follows the target after the toggle
    pub following: bool,
    /// Target's follower count after the toggle
    pub follower_count: i64,
}

/// Follow graph service
pub struct GraphService {
    db: Arc<Database>,
}

impl GraphService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Follow the target account if not yet followed, otherwise unfollow it.
    ///
    /// The target always receives a `follow` or `unfollow` notification.
    /// Toggling oneself removes (or restores) the self-follow edge.
    ///
    /// # Errors
    /// `NotFound` if the target account has no profile
    pub async fn toggle_follow(
        &self,
        actor: &Actor,
        target_account_id: &str,
    ) -> Result<FollowOutcome, AppError> {
        let target = self
            .db
            .get_profile_by_account(target_account_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let (following, notification) = self.db.toggle_follow(&actor.profile_id, &target.id).await?;
        let (_, follower_count) = self.db.count_follow_edges(&target.id).await?;

        let state = if following { "on" } else { "off" };
        ENGAGEMENT_EVENTS_TOTAL
            .with_label_values(&["follow", state])
            .inc();
        NOTIFICATIONS_TOTAL
            .with_label_values(&[notification.kind.as_str()])
            .inc();

        tracing::info!(
            follower = %actor.profile_id,
            target = %target.id,
            following,
            "Follow toggled"
        );

        Ok(FollowOutcome {
            following,
            follower_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::{create_test_db, register};

    #[tokio::test]
    async fn follow_then_unfollow_restores_graph_and_notifies_twice() {
        let (db, _temp_dir) = create_test_db().await;
        let service = GraphService::new(db.clone());
        let alice = register(&db, "alice").await;
        let bob = register(&db, "bob").await;

        let before = db.get_followed_profile_ids(&alice.profile_id).await.unwrap();

        let followed = service.toggle_follow(&alice, &bob.account_id).await.unwrap();
        assert_eq!(
            followed,
            FollowOutcome {
                following: true,
                follower_count: 2,
            }
        );
        assert!(db.is_following(&alice.profile_id, &bob.profile_id).await.unwrap());

        let unfollowed = service.toggle_follow(&alice, &bob.account_id).await.unwrap();
        assert!(!unfollowed.following);
        assert_eq!(unfollowed.follower_count, 1);

        let after = db.get_followed_profile_ids(&alice.profile_id).await.unwrap();
        assert_eq!(before, after);

        let kinds: Vec<String> = db
            .get_notifications_for(&bob.profile_id)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.kind)
            .collect();
        assert_eq!(kinds.len(), 2);
        assert!(kinds.contains(&"follow".to_string()));
        assert!(kinds.contains(&"unfollow".to_string()));
    }

    #[tokio::test]
    async fn toggling_self_removes_bootstrap_edge() {
        let (db, _temp_dir) = create_test_db().await;
        let service = GraphService::new(db.clone());
        let alice = register(&db, "alice").await;

        assert_eq!(db.count_follow_edges(&alice.profile_id).await.unwrap(), (1, 1));

        let outcome = service.toggle_follow(&alice, &alice.account_id).await.unwrap();
        assert!(!outcome.following);
        assert_eq!(db.count_follow_edges(&alice.profile_id).await.unwrap(), (0, 0));

        let notifications = db.get_notifications_for(&alice.profile_id).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, "unfollow");
    }

    #[tokio::test]
    async fn unknown_target_is_not_found() {
        let (db, _temp_dir) = create_test_db().await;
        let service = GraphService::new(db.clone());
        let alice = register(&db, "alice").await;

        let error = service
            .toggle_follow(&alice, "01UNKNOWNACCOUNT")
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::NotFound));
    }
}

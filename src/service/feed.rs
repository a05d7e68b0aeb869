//! Feed assembly service
//!
//! Read-side views: home feed, profile pages, saved posts, profile
//! listings and username lookup.

use std::sync::Arc;

use serde::Deserialize;

use super::Actor;
use crate::data::{Database, PostSummary, ProfileCard, ProfileView};
use crate::error::AppError;

/// Page size when none is requested
pub const DEFAULT_PAGE_LIMIT: usize = 20;
/// Largest page size a client may request
pub const MAX_PAGE_LIMIT: usize = 40;
/// Maximum usernames returned by suggestions
pub const SUGGEST_LIMIT: usize = 10;

/// Keyset pagination parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<usize>,
    /// Return only posts older than this post ID
    pub max_id: Option<String>,
}

impl PageParams {
    fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }

    fn cursor(&self) -> Option<&str> {
        self.max_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Feed assembly service
pub struct FeedService {
    db: Arc<Database>,
}

impl FeedService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// All posts, newest first, annotated for the viewer.
    ///
    /// Anonymous viewers get an empty feed.
    pub async fn home_feed(
        &self,
        viewer: Option<&Actor>,
        params: &PageParams,
    ) -> Result<Vec<PostSummary>, AppError> {
        let Some(viewer) = viewer else {
            return Ok(Vec::new());
        };

        self.db
            .get_home_feed(&viewer.account_id, params.effective_limit(), params.cursor())
            .await
    }

    /// Posts by one account, newest first
    pub async fn profile_feed(
        &self,
        viewer: &Actor,
        account_id: &str,
        params: &PageParams,
    ) -> Result<Vec<PostSummary>, AppError> {
        self.db
            .get_account_feed(
                account_id,
                &viewer.account_id,
                params.effective_limit(),
                params.cursor(),
            )
            .await
    }

    /// The viewer's saved posts, most recently saved first
    pub async fn saved_feed(&self, viewer: &Actor) -> Result<Vec<PostSummary>, AppError> {
        self.db.get_saved_feed(&viewer.account_id).await
    }

    /// A profile with follower counts and the viewer's follow state
    ///
    /// # Errors
    /// `NotFound` if the account has no profile
    pub async fn profile_view(
        &self,
        viewer: &Actor,
        account_id: &str,
    ) -> Result<ProfileView, AppError> {
        self.db
            .get_profile_view(account_id, &viewer.profile_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Every profile except the viewer's
    pub async fn list_profiles(&self, viewer: &Actor) -> Result<Vec<ProfileCard>, AppError> {
        self.db.list_profiles_except(&viewer.account_id).await
    }

    /// Exact (case-sensitive) username lookup
    ///
    /// # Errors
    /// `NotFound` if no account has that username
    pub async fn search(&self, viewer: &Actor, username: &str) -> Result<ProfileView, AppError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AppError::NotFound);
        }

        let account = self
            .db
            .get_account_by_username(username)
            .await?
            .ok_or(AppError::NotFound)?;
        self.profile_view(viewer, &account.id).await
    }

    /// Usernames containing the fragment, case-insensitive, at most ten
    pub async fn suggest(&self, fragment: &str) -> Result<Vec<String>, AppError> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Ok(Vec::new());
        }
        self.db.suggest_usernames(fragment, SUGGEST_LIMIT).await
    }
}

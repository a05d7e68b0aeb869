//! Post service
//!
//! Creates and deletes posts along with their optional image.

use std::sync::Arc;

use super::{Actor, ImageUpload};
use crate::data::{Database, EntityId, Post};
use crate::error::AppError;
use crate::metrics::POSTS_CREATED_TOTAL;
use crate::storage::{MAX_IMAGE_UPLOAD_BYTES, MediaStorage};

/// Longest accepted title, in characters
pub const MAX_TITLE_CHARS: usize = 35;
/// Longest accepted body, in characters
pub const MAX_BODY_CHARS: usize = 300;

/// Input for [`PostService::create_post`]
#[derive(Debug, Clone)]
pub struct NewPostInput {
    pub title: String,
    pub body: String,
    pub image: Option<ImageUpload>,
}

fn validate_text(field: &str, value: &str, max_chars: usize) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{} cannot be empty", field)));
    }
    if value.chars().count() > max_chars {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, max_chars
        )));
    }
    Ok(value.to_string())
}

/// Post service
pub struct PostService {
    db: Arc<Database>,
    storage: Arc<MediaStorage>,
}

impl PostService {
    pub fn new(db: Arc<Database>, storage: Arc<MediaStorage>) -> Self {
        Self { db, storage }
    }

    /// Create a post owned by the actor.
    ///
    /// The image is stored first and removed again if the insert fails.
    ///
    /// # Errors
    /// `Validation` for bad title/body lengths or an unsupported image
    pub async fn create_post(&self, actor: &Actor, input: NewPostInput) -> Result<Post, AppError> {
        let title = validate_text("title", &input.title, MAX_TITLE_CHARS)?;
        let body = validate_text("body", &input.body, MAX_BODY_CHARS)?;

        let id = EntityId::new().0;

        let image_key = match input.image {
            Some(image) => {
                if image.data.is_empty() {
                    return Err(AppError::Validation("image data is empty".to_string()));
                }
                if image.data.len() > MAX_IMAGE_UPLOAD_BYTES {
                    return Err(AppError::Validation(format!(
                        "File too large: exceeds {} bytes",
                        MAX_IMAGE_UPLOAD_BYTES
                    )));
                }
                let (key, _url) = self
                    .storage
                    .upload_post_image(&id, image.data, &image.content_type)
                    .await?;
                Some(key)
            }
            None => None,
        };

        let post = Post {
            id,
            account_id: actor.account_id.clone(),
            title,
            image_key,
            body,
            created_at: chrono::Utc::now(),
        };

        if let Err(error) = self.db.insert_post(&post).await {
            if let Some(key) = &post.image_key {
                if let Err(cleanup_error) = self.storage.delete(key).await {
                    tracing::warn!(
                        key = %key,
                        error = %cleanup_error,
                        "failed to remove uploaded post image after database insert error"
                    );
                }
            }
            return Err(error);
        }

        POSTS_CREATED_TOTAL.inc();
        tracing::info!(
            post_id = %post.id,
            account_id = %actor.account_id,
            has_image = post.image_key.is_some(),
            "Post created"
        );

        Ok(post)
    }

    /// Delete one of the actor's posts and its stored image.
    ///
    /// # Errors
    /// `NotFound` if the post does not exist, `Forbidden` if the actor
    /// does not own it
    pub async fn delete_post(&self, actor: &Actor, post_id: &str) -> Result<(), AppError> {
        let post = self.db.get_post(post_id).await?.ok_or(AppError::NotFound)?;
        if post.account_id != actor.account_id {
            return Err(AppError::Forbidden);
        }

        if !self.db.delete_post(post_id, &actor.account_id).await? {
            return Err(AppError::NotFound);
        }

        if let Some(key) = post.image_key.as_deref() {
            if let Err(error) = self.storage.delete(key).await {
                tracing::warn!(
                    key = %key,
                    error = %error,
                    "failed to delete post image from storage"
                );
            }
        }

        tracing::info!(post_id = %post_id, account_id = %actor.account_id, "Post deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::{create_test_db, create_test_storage, register};

    fn text_post(title: &str, body: &str) -> NewPostInput {
        NewPostInput {
            title: title.to_string(),
            body: body.to_string(),
            image: None,
        }
    }

    #[tokio::test]
    async fn create_post_trims_and_persists() {
        let (db, temp_dir) = create_test_db().await;
        let storage = create_test_storage(&temp_dir).await;
        let service = PostService::new(db.clone(), storage);
        let alice = register(&db, "alice").await;

        let post = service
            .create_post(&alice, text_post("  Hello  ", " First post "))
            .await
            .unwrap();
        assert_eq!(post.title, "Hello");
        assert_eq!(post.body, "First post");
        assert_eq!(post.account_id, alice.account_id);

        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Hello");
    }

    #[tokio::test]
    async fn create_post_validates_lengths() {
        let (db, temp_dir) = create_test_db().await;
        let storage = create_test_storage(&temp_dir).await;
        let service = PostService::new(db.clone(), storage);
        let alice = register(&db, "alice").await;

        let long_title = "t".repeat(MAX_TITLE_CHARS + 1);
        let long_body = "b".repeat(MAX_BODY_CHARS + 1);
        for input in [
            text_post("", "body"),
            text_post("title", "   "),
            text_post(&long_title, "body"),
            text_post("title", &long_body),
        ] {
            assert!(matches!(
                service.create_post(&alice, input).await,
                Err(AppError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn image_is_stored_and_removed_with_post() {
        let (db, temp_dir) = create_test_db().await;
        let storage = create_test_storage(&temp_dir).await;
        let service = PostService::new(db.clone(), storage);
        let alice = register(&db, "alice").await;

        let post = service
            .create_post(
                &alice,
                NewPostInput {
                    title: "Pic".to_string(),
                    body: "with image".to_string(),
                    image: Some(ImageUpload {
                        data: b"gif-bytes".to_vec(),
                        content_type: "image/gif".to_string(),
                    }),
                },
            )
            .await
            .unwrap();
        let key = post.image_key.clone().unwrap();
        assert_eq!(key, format!("posts/{}.gif", post.id));

        let path = temp_dir.path().join("media").join(&key);
        assert!(path.exists());

        service.delete_post(&alice, &post.id).await.unwrap();
        assert!(!path.exists());
        assert!(db.get_post(&post.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unsupported_image_type_is_rejected() {
        let (db, temp_dir) = create_test_db().await;
        let storage = create_test_storage(&temp_dir).await;
        let service = PostService::new(db.clone(), storage);
        let alice = register(&db, "alice").await;

        let error = service
            .create_post(
                &alice,
                NewPostInput {
                    title: "Doc".to_string(),
                    body: "pdf".to_string(),
                    image: Some(ImageUpload {
                        data: b"%PDF".to_vec(),
                        content_type: "application/pdf".to_string(),
                    }),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn only_owner_can_delete() {
        let (db, temp_dir) = create_test_db().await;
        let storage = create_test_storage(&temp_dir).await;
        let service = PostService::new(db.clone(), storage);
        let alice = register(&db, "alice").await;
        let bob = register(&db, "bob").await;

        let post = service
            .create_post(&alice, text_post("Mine", "hands off"))
            .await
            .unwrap();

        assert!(matches!(
            service.delete_post(&bob, &post.id).await,
            Err(AppError::Forbidden)
        ));
        assert!(db.get_post(&post.id).await.unwrap().is_some());

        assert!(matches!(
            service.delete_post(&bob, "missing").await,
            Err(AppError::NotFound)
        ));
    }
}

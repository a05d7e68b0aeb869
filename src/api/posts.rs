//! Post, like, save and comment endpoints

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Json,
};

use super::converters::*;
use super::dto::*;
use super::upload::{read_image_field, read_text_field};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::metrics::HTTP_REQUEST_DURATION_SECONDS;
use crate::service::{EngagementService, NewPostInput, PostService, ToggleOutcome};

/// POST /posts
///
/// Multipart fields: `title`, `body` and an optional `image`.
pub async fn create_post(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<PostResponse>), AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/posts"])
        .start_timer();

    let mut title = None;
    let mut body = None;
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to parse multipart: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "title" => title = Some(read_text_field(field, "title").await?),
            "body" => body = Some(read_text_field(field, "body").await?),
            "image" => {
                // Browsers send an empty part when no file is chosen
                if field.file_name().is_some_and(|name| name.is_empty()) {
                    continue;
                }
                image = Some(read_image_field(field).await?);
            }
            _ => {}
        }
    }

    let post_service = PostService::new(state.db.clone(), state.storage.clone());
    let post = post_service
        .create_post(
            &actor,
            NewPostInput {
                title: title.unwrap_or_default(),
                body: body.unwrap_or_default(),
                image,
            },
        )
        .await?;

    let summary = state
        .db
        .get_post_summary(&post.id, &actor.account_id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok((
        StatusCode::CREATED,
        Json(post_to_response(&summary, &state.storage)),
    ))
}

/// DELETE /posts/:id
pub async fn delete_post(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["DELETE", "/posts/:id"])
        .start_timer();

    PostService::new(state.db.clone(), state.storage.clone())
        .delete_post(&actor, &id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /posts/:id/like
pub async fn toggle_like(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ToggleOutcome>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/posts/:id/like"])
        .start_timer();

    let outcome = EngagementService::new(state.db.clone())
        .toggle_like(&actor, &id)
        .await?;
    Ok(Json(outcome))
}

/// POST /posts/:id/save
pub async fn toggle_save(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ToggleOutcome>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/posts/:id/save"])
        .start_timer();

    let outcome = EngagementService::new(state.db.clone())
        .toggle_save(&actor, &id)
        .await?;
    Ok(Json(outcome))
}

/// GET /posts/:id/comments
pub async fn list_comments(
    State(state): State<AppState>,
    CurrentUser(_actor): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<CommentResponse>>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/posts/:id/comments"])
        .start_timer();

    let comments = EngagementService::new(state.db.clone())
        .list_comments(&id)
        .await?;
    Ok(Json(comments.iter().map(comment_to_response).collect()))
}

/// POST /posts/:id/comments
pub async fn add_comment(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/posts/:id/comments"])
        .start_timer();

    let comment = EngagementService::new(state.db.clone())
        .add_comment(&actor, &id, &req.text)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            id: comment.id,
            account_id: comment.account_id,
            username: actor.username,
            post_id: comment.post_id,
            body: comment.body,
            created_at: comment.created_at,
        }),
    ))
}

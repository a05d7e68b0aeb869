//! Feed, saved-post and user lookup endpoints

use axum::{
    extract::{Query, State},
    response::Json,
};

use super::converters::*;
use super::dto::*;
use crate::AppState;
use crate::auth::{CurrentUser, MaybeUser};
use crate::error::AppError;
use crate::metrics::HTTP_REQUEST_DURATION_SECONDS;
use crate::service::{FeedService, PageParams};

/// GET /
///
/// Anonymous visitors get an empty list.
pub async fn home_feed(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Query(params): Query<PageParams>,
) -> Result<Json<Vec<PostResponse>>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/"])
        .start_timer();

    let posts = FeedService::new(state.db.clone())
        .home_feed(viewer.as_ref(), &params)
        .await?;
    Ok(Json(posts_to_response(&posts, &state.storage)))
}

/// GET /saved
pub async fn saved_feed(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<Vec<PostResponse>>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/saved"])
        .start_timer();

    let posts = FeedService::new(state.db.clone()).saved_feed(&actor).await?;
    Ok(Json(posts_to_response(&posts, &state.storage)))
}

/// GET /search?username=
pub async fn search(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(query): Query<UsernameQuery>,
) -> Result<Json<ProfileViewResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/search"])
        .start_timer();

    let view = FeedService::new(state.db.clone())
        .search(&actor, &query.username)
        .await?;
    Ok(Json(profile_view_to_response(&view, &state.storage)))
}

/// GET /suggest?username=
pub async fn suggest(
    State(state): State<AppState>,
    CurrentUser(_actor): CurrentUser,
    Query(query): Query<UsernameQuery>,
) -> Result<Json<Vec<String>>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/suggest"])
        .start_timer();

    let usernames = FeedService::new(state.db.clone())
        .suggest(&query.username)
        .await?;
    Ok(Json(usernames))
}

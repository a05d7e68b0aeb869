//! Notification endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use super::converters::notification_to_response;
use super::dto::*;
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::metrics::HTTP_REQUEST_DURATION_SECONDS;
use crate::service::NotificationService;

/// GET /notifications
pub async fn list_unread(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<Vec<NotificationResponse>>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/notifications"])
        .start_timer();

    let notifications = NotificationService::new(state.db.clone())
        .list_unread(&actor)
        .await?;
    Ok(Json(
        notifications.iter().map(notification_to_response).collect(),
    ))
}

/// GET /notifications/summary
pub async fn unread_summary(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<NotificationSummaryResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/notifications/summary"])
        .start_timer();

    let summary = NotificationService::new(state.db.clone())
        .unread_summary(&actor)
        .await?;
    Ok(Json(NotificationSummaryResponse {
        unread_count: summary.unread_count,
        latest: summary.latest.iter().map(notification_to_response).collect(),
    }))
}

/// POST /notifications/:id/read
///
/// Any signed-in user may mark any notification.
pub async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(_actor): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/notifications/:id/read"])
        .start_timer();

    NotificationService::new(state.db.clone())
        .mark_read(&id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

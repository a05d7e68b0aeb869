//! Phone verification endpoints

use axum::{extract::State, http::StatusCode, response::Json};

use super::dto::*;
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::metrics::HTTP_REQUEST_DURATION_SECONDS;
use crate::service::PhoneVerificationService;

fn build_phone_service(state: &AppState) -> PhoneVerificationService {
    PhoneVerificationService::new(
        state.db.clone(),
        state.sms.clone(),
        state.config.sms.otp_ttl_seconds,
    )
}

/// POST /phone/otp
pub async fn send_code(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<(StatusCode, Json<OtpSentResponse>), AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/phone/otp"])
        .start_timer();

    let expires_in = build_phone_service(&state).send_code(&actor).await?;
    Ok((StatusCode::ACCEPTED, Json(OtpSentResponse { expires_in })))
}

/// POST /phone/otp/verify
pub async fn verify_code(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<StatusCode, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/phone/otp/verify"])
        .start_timer();

    build_phone_service(&state)
        .verify_code(&actor, &req.code)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

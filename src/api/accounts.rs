//! Account, session and profile endpoints

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

use super::converters::*;
use super::dto::*;
use super::upload::read_image_field;
use crate::AppState;
use crate::auth::{CurrentUser, SESSION_COOKIE, Session, create_session_token};
use crate::data::{Gender, ProfilePatch};
use crate::error::AppError;
use crate::metrics::HTTP_REQUEST_DURATION_SECONDS;
use crate::service::{AccountService, FeedService, GraphService, PageParams, RegisterInput};

fn build_account_service(state: &AppState) -> AccountService {
    AccountService::new(
        state.db.clone(),
        state.storage.clone(),
        state.config.server.base_url(),
        state.config.auth.password_reset_ttl,
    )
}

fn build_session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

fn clear_session_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE, "".to_string()))
        .path("/")
        .http_only(true)
        .build();
    cookie.make_removal();
    cookie
}

fn parse_gender(value: Option<String>) -> Result<Option<Gender>, AppError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => Gender::parse(raw)
            .map(Some)
            .ok_or_else(|| AppError::Validation("gender must be one of M, F, O".to_string())),
    }
}

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/register"])
        .start_timer();

    let (account, profile) = build_account_service(&state)
        .register(RegisterInput {
            username: req.username,
            email: req.email,
            password: req.password,
            phone_number: req.phone_number,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(account_to_response(&account, &profile.id)),
    ))
}

/// POST /login
///
/// Sets the `session` cookie and also returns the token for Bearer use.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/login"])
        .start_timer();

    let account = build_account_service(&state)
        .authenticate(&req.username, &req.password)
        .await?;
    let profile = state
        .db
        .get_profile_by_account(&account.id)
        .await?
        .ok_or(AppError::NotFound)?;

    let session = Session::new(
        &account.id,
        &account.username,
        state.config.auth.session_max_age,
    );
    let token = create_session_token(&session, &state.config.auth.session_secret)?;
    let jar = jar.add(build_session_cookie(
        token.clone(),
        state.config.should_use_secure_cookies(),
    ));

    Ok((
        jar,
        Json(LoginResponse {
            token,
            account: account_to_response(&account, &profile.id),
        }),
    ))
}

/// POST /logout
pub async fn logout(jar: CookieJar) -> (CookieJar, StatusCode) {
    (jar.add(clear_session_cookie()), StatusCode::NO_CONTENT)
}

/// POST /password_reset
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/password_reset"])
        .start_timer();

    let issued = build_account_service(&state)
        .request_password_reset(&req.email)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "message": "Password reset link sent",
            "expires_at": issued.expires_at,
        })),
    ))
}

/// POST /password_reset/confirm
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetConfirmRequest>,
) -> Result<StatusCode, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/password_reset/confirm"])
        .start_timer();

    build_account_service(&state)
        .confirm_password_reset(&req.token, &req.new_password)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /profiles
pub async fn list_profiles(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<Vec<ProfileCardResponse>>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/profiles"])
        .start_timer();

    let cards = FeedService::new(state.db.clone())
        .list_profiles(&actor)
        .await?;

    Ok(Json(
        cards
            .iter()
            .map(|card| profile_card_to_response(card, &state.storage))
            .collect(),
    ))
}

/// GET /profiles/:account_id
pub async fn get_profile_page(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(account_id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<ProfilePageResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/profiles/:account_id"])
        .start_timer();

    let feed_service = FeedService::new(state.db.clone());
    let view = feed_service.profile_view(&actor, &account_id).await?;
    let posts = feed_service
        .profile_feed(&actor, &account_id, &params)
        .await?;

    Ok(Json(ProfilePageResponse {
        profile: profile_view_to_response(&view, &state.storage),
        posts: posts_to_response(&posts, &state.storage),
    }))
}

/// POST /profiles/:account_id/follow
pub async fn toggle_follow(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(account_id): Path<String>,
) -> Result<Json<FollowResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/profiles/:account_id/follow"])
        .start_timer();

    let outcome = GraphService::new(state.db.clone())
        .toggle_follow(&actor, &account_id)
        .await?;

    Ok(Json(FollowResponse {
        following: outcome.following,
        follower_count: outcome.follower_count,
    }))
}

/// GET /profile
pub async fn get_own_profile(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let profile = build_account_service(&state).get_profile(&actor).await?;
    Ok(Json(profile_to_response(
        &profile,
        &actor.username,
        &state.storage,
    )))
}

/// PATCH /profile
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["PATCH", "/profile"])
        .start_timer();

    let gender = match req.gender {
        Some(value) => Some(parse_gender(value)?),
        None => None,
    };
    let patch = ProfilePatch {
        display_name: req.display_name,
        gender,
        date_of_birth: req.date_of_birth,
        bio: req.bio,
    };

    let profile = build_account_service(&state)
        .update_profile(&actor, patch)
        .await?;

    Ok(Json(profile_to_response(
        &profile,
        &actor.username,
        &state.storage,
    )))
}

/// PUT /profile/avatar
///
/// Multipart field `avatar` (or `file`) carrying a jpeg/png/gif/webp image.
pub async fn update_avatar(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<AvatarResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["PUT", "/profile/avatar"])
        .start_timer();

    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to parse multipart: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        if matches!(field_name.as_str(), "avatar" | "file") {
            image = Some(read_image_field(field).await?);
        }
    }

    let image = image.ok_or(AppError::Validation("No file provided".to_string()))?;
    let avatar_url = build_account_service(&state)
        .update_avatar(&actor, image)
        .await?;

    Ok(Json(AvatarResponse { avatar_url }))
}

/// DELETE /profile/avatar
pub async fn clear_avatar(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<StatusCode, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["DELETE", "/profile/avatar"])
        .start_timer();

    build_account_service(&state).clear_avatar(&actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

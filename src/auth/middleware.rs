//! Authentication extractors
//!
//! Resolve the session token (Bearer header or `session` cookie) into the
//! acting user for handlers that need one.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use axum_extra::extract::CookieJar;

use super::session::{SESSION_COOKIE, verify_session_token};
use crate::AppState;
use crate::error::AppError;
use crate::service::Actor;

fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(ToOwned::to_owned)
        .or_else(|| {
            let jar = CookieJar::from_headers(headers);
            jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_owned())
        })
}

/// Resolve a token into an actor.
///
/// `None` when the token is invalid, expired or names an account that no
/// longer has a profile.
async fn authenticate_token(token: &str, state: &AppState) -> Result<Option<Actor>, AppError> {
    let Ok(session) = verify_session_token(token, &state.config.auth.session_secret) else {
        return Ok(None);
    };

    let Some(profile) = state.db.get_profile_by_account(&session.account_id).await? else {
        tracing::debug!(account_id = %session.account_id, "Session for unknown account");
        return Ok(None);
    };

    Ok(Some(Actor {
        account_id: session.account_id,
        profile_id: profile.id,
        username: session.username,
    }))
}

async fn resolve_actor(parts: &mut Parts, state: &AppState) -> Result<Option<Actor>, AppError> {
    if let Some(actor) = parts.extensions.get::<Actor>().cloned() {
        return Ok(Some(actor));
    }

    let Some(token) = extract_token_from_headers(&parts.headers) else {
        return Ok(None);
    };

    let actor = authenticate_token(&token, state).await?;
    if let Some(actor) = &actor {
        parts.extensions.insert(actor.clone());
    }
    Ok(actor)
}

/// Extractor for current authenticated user
///
/// Anonymous requests are rejected with a redirect to the login page
/// carrying the original path as `next`.
///
/// # Usage
/// ```ignore
/// async fn handler(
///     CurrentUser(actor): CurrentUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}", actor.username)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        match resolve_actor(parts, &state).await? {
            Some(actor) => Ok(CurrentUser(actor)),
            None => {
                let next = parts
                    .uri
                    .path_and_query()
                    .map(|path| path.as_str().to_string())
                    .unwrap_or_else(|| parts.uri.path().to_string());
                Err(AppError::LoginRequired { next })
            }
        }
    }
}

/// Optional current user extractor
///
/// Returns None if not authenticated, instead of error.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Actor>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        Ok(MaybeUser(resolve_actor(parts, &state).await?))
    }
}

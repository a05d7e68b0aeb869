//! Account service
//!
//! Registration, login, profile edits, avatars and password reset.

use std::sync::Arc;

use chrono::{Duration, Utc};

use super::{Actor, ImageUpload, normalize_optional_text};
use crate::auth::password::{generate_reset_token, hash_password, hash_secret, verify_password};
use crate::data::{
    Account, Database, EntityId, NewAccount, PasswordResetToken, Profile, ProfilePatch,
};
use crate::error::AppError;
use crate::metrics::REGISTRATIONS_TOTAL;
use crate::storage::{MAX_IMAGE_UPLOAD_BYTES, MediaStorage};

/// Longest accepted username, in characters
pub const MAX_USERNAME_CHARS: usize = 150;
/// Longest accepted display name, in characters
pub const MAX_DISPLAY_NAME_CHARS: usize = 300;

/// Input for [`AccountService::register`]
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub phone_number: Option<String>,
}

/// A freshly issued password reset token (raw value, never stored)
#[derive(Debug, Clone)]
pub struct PasswordResetIssued {
    pub account_id: String,
    pub token: String,
    pub expires_at: chrono::DateTime<Utc>,
}

fn validate_username(username: &str) -> Result<(), AppError> {
    let length = username.chars().count();
    if length == 0 || length > MAX_USERNAME_CHARS {
        return Err(AppError::Validation(format!(
            "username must be between 1 and {} characters",
            MAX_USERNAME_CHARS
        )));
    }
    let allowed = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
    if !allowed {
        return Err(AppError::Validation(
            "username may contain only letters, digits and @/./+/-/_".to_string(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), AppError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@') && !email.contains(' ')
        }
        None => false,
    };
    if !valid {
        return Err(AppError::Validation("Enter a valid email address".to_string()));
    }
    Ok(())
}

/// Account service
pub struct AccountService {
    db: Arc<Database>,
    storage: Arc<MediaStorage>,
    base_url: String,
    password_reset_ttl: Duration,
}

impl AccountService {
    /// Create new account service
    ///
    /// # Arguments
    /// * `base_url` - Public site URL used in password reset links
    /// * `password_reset_ttl_seconds` - Reset token lifetime
    pub fn new(
        db: Arc<Database>,
        storage: Arc<MediaStorage>,
        base_url: String,
        password_reset_ttl_seconds: i64,
    ) -> Self {
        Self {
            db,
            storage,
            base_url,
            password_reset_ttl: Duration::seconds(password_reset_ttl_seconds),
        }
    }

    /// Register an account together with its profile and self-follow edge.
    ///
    /// # Errors
    /// `Validation` for malformed input, a taken username or a taken phone
    /// number. Nothing is persisted on failure.
    pub async fn register(&self, input: RegisterInput) -> Result<(Account, Profile), AppError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();
        validate_username(&username)?;
        validate_email(&email)?;

        let phone_number = input.phone_number.and_then(normalize_optional_text);
        if let Some(phone) = &phone_number {
            if !crate::sms::is_valid_e164(phone) {
                return Err(AppError::Validation(
                    "Phone number must be in E.164 format (e.g., +14155551234)".to_string(),
                ));
            }
        }

        let password = input.password;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(e.into()))??;

        let (account, profile) = self
            .db
            .register_account(&NewAccount {
                username,
                email,
                password_hash,
                phone_number,
            })
            .await?;

        REGISTRATIONS_TOTAL.inc();
        tracing::info!(
            account_id = %account.id,
            username = %account.username,
            "Account registered"
        );

        Ok((account, profile))
    }

    /// Check credentials. An identifier containing `@` is treated as an email.
    ///
    /// # Errors
    /// `Unauthorized` for an unknown identifier or wrong password
    pub async fn authenticate(&self, identifier: &str, password: &str) -> Result<Account, AppError> {
        let identifier = identifier.trim();
        let account = if identifier.contains('@') {
            self.db.get_account_by_email(identifier).await?
        } else {
            self.db.get_account_by_username(identifier).await?
        };

        let Some(account) = account else {
            tracing::debug!("Login attempt for unknown identifier");
            return Err(AppError::Unauthorized);
        };

        let password = password.to_string();
        let hash = account.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(e.into()))??;
        if !matches {
            tracing::info!(account_id = %account.id, "Login rejected: wrong password");
            return Err(AppError::Unauthorized);
        }

        tracing::info!(account_id = %account.id, "Login succeeded");
        Ok(account)
    }

    /// The actor's own profile
    pub async fn get_profile(&self, actor: &Actor) -> Result<Profile, AppError> {
        self.db
            .get_profile_by_account(&actor.account_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Update profile fields. Blank strings clear a field.
    pub async fn update_profile(
        &self,
        actor: &Actor,
        patch: ProfilePatch,
    ) -> Result<Profile, AppError> {
        let patch = ProfilePatch {
            display_name: patch
                .display_name
                .map(|value| value.and_then(normalize_optional_text)),
            bio: patch.bio.map(|value| value.and_then(normalize_optional_text)),
            ..patch
        };

        if let Some(Some(display_name)) = &patch.display_name {
            if display_name.chars().count() > MAX_DISPLAY_NAME_CHARS {
                return Err(AppError::Validation(format!(
                    "display name must be at most {} characters",
                    MAX_DISPLAY_NAME_CHARS
                )));
            }
        }
        if let Some(Some(date_of_birth)) = patch.date_of_birth {
            if date_of_birth > Utc::now().date_naive() {
                return Err(AppError::Validation(
                    "date of birth cannot be in the future".to_string(),
                ));
            }
        }

        if patch.is_empty() {
            return self.get_profile(actor).await;
        }

        let updated = self
            .db
            .patch_profile(&actor.profile_id, &patch, Utc::now())
            .await?;
        if !updated {
            return Err(AppError::NotFound);
        }

        tracing::info!(profile_id = %actor.profile_id, "Profile updated");
        self.get_profile(actor).await
    }

    /// Replace the avatar image
    ///
    /// The previous file is deleted only after the new key is committed.
    ///
    /// # Returns
    /// Public URL of the new avatar
    pub async fn update_avatar(&self, actor: &Actor, image: ImageUpload) -> Result<String, AppError> {
        if image.data.is_empty() {
            return Err(AppError::Validation(
                "avatar image data is empty".to_string(),
            ));
        }
        if image.data.len() > MAX_IMAGE_UPLOAD_BYTES {
            return Err(AppError::Validation(format!(
                "File too large: exceeds {} bytes",
                MAX_IMAGE_UPLOAD_BYTES
            )));
        }

        let profile = self.get_profile(actor).await?;
        let previous_key = profile.avatar_key.clone();

        let image_id = EntityId::new().0;
        let (avatar_key, avatar_url) = self
            .storage
            .upload_avatar(&image_id, image.data, &image.content_type)
            .await?;

        let updated = match self
            .db
            .update_avatar_key_if_matches(
                &profile.id,
                previous_key.as_deref(),
                Some(&avatar_key),
                Utc::now(),
            )
            .await
        {
            Ok(updated) => updated,
            Err(error) => {
                self.discard_upload(&avatar_key, "database update error").await;
                return Err(error);
            }
        };
        if !updated {
            self.discard_upload(&avatar_key, "concurrent update").await;
            return Err(AppError::Validation(
                "avatar changed concurrently; retry".to_string(),
            ));
        }

        if let Some(old_key) = previous_key.as_deref().filter(|old| *old != avatar_key) {
            if let Err(error) = self.storage.delete(old_key).await {
                tracing::warn!(
                    key = %old_key,
                    error = %error,
                    "failed to delete previous avatar from storage"
                );
            }
        }

        tracing::info!(profile_id = %profile.id, key = %avatar_key, "Avatar updated");
        Ok(avatar_url)
    }

    /// Remove the avatar and delete its file
    pub async fn clear_avatar(&self, actor: &Actor) -> Result<(), AppError> {
        let profile = self.get_profile(actor).await?;
        let Some(previous_key) = profile.avatar_key else {
            return Ok(());
        };

        let updated = self
            .db
            .update_avatar_key_if_matches(&profile.id, Some(&previous_key), None, Utc::now())
            .await?;
        if !updated {
            return Err(AppError::Validation(
                "avatar changed concurrently; retry".to_string(),
            ));
        }

        if let Err(error) = self.storage.delete(&previous_key).await {
            tracing::warn!(
                key = %previous_key,
                error = %error,
                "failed to delete cleared avatar from storage"
            );
        }

        tracing::info!(profile_id = %profile.id, "Avatar cleared");
        Ok(())
    }

    /// Public URL for a stored key
    pub fn media_url(&self, key: &str) -> String {
        self.storage.get_public_url(key)
    }

    /// Issue a password reset token for the account registered with `email`.
    ///
    /// The reset link is written to the log; mail delivery is external.
    ///
    /// # Errors
    /// `Validation("This email is not registered")` for unknown emails
    pub async fn request_password_reset(
        &self,
        email: &str,
    ) -> Result<PasswordResetIssued, AppError> {
        let account = self
            .db
            .get_account_by_email(email.trim())
            .await?
            .ok_or_else(|| AppError::Validation("This email is not registered".to_string()))?;

        let token = generate_reset_token();
        let now = Utc::now();
        let expires_at = now + self.password_reset_ttl;

        self.db
            .insert_password_reset_token(&PasswordResetToken {
                id: EntityId::new().0,
                account_id: account.id.clone(),
                token_hash: hash_secret(&token),
                created_at: now,
                expires_at,
                used_at: None,
            })
            .await?;

        tracing::info!(
            account_id = %account.id,
            reset_link = %format!("{}/password_reset/confirm?token={}", self.base_url, token),
            expires_at = %expires_at,
            "Password reset requested"
        );

        Ok(PasswordResetIssued {
            account_id: account.id,
            token,
            expires_at,
        })
    }

    /// Set a new password using a reset token. Tokens are single-use.
    ///
    /// # Errors
    /// `Validation` for an unknown, used or expired token, or a weak password
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let password = new_password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(e.into()))??;

        let account_id = self
            .db
            .consume_password_reset_token(&hash_secret(token.trim()), &password_hash, Utc::now())
            .await?
            .ok_or_else(|| {
                AppError::Validation("The password reset link is invalid or has expired".to_string())
            })?;

        tracing::info!(account_id = %account_id, "Password reset completed");
        Ok(())
    }

    async fn discard_upload(&self, key: &str, reason: &str) {
        if let Err(cleanup_error) = self.storage.delete(key).await {
            tracing::warn!(
                key = %key,
                error = %cleanup_error,
                reason,
                "failed to rollback uploaded avatar"
            );
        }
    }
}

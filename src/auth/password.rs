//! Password and one-time secret hashing
//!
//! Passwords use Argon2id PHC strings. Reset tokens and OTP codes are
//! short-lived random values, stored as SHA-256 digests.

use argon2::{
    Argon2, PasswordHash, PasswordVerifier,
    password_hash::{PasswordHasher, SaltString},
};

use crate::error::AppError;

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 8;

/// Hash a password using Argon2id
///
/// # Errors
/// `Validation` if the password is shorter than [`MIN_PASSWORD_LEN`]
pub fn hash_password(password: &str) -> Result<String, AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let salt = SaltString::generate(&mut rand::thread_rng());
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to hash password: {}", e)))?
        .to_string();

    Ok(password_hash)
}

/// Verify a password against a stored hash
///
/// # Returns
/// `false` on mismatch, error only if the stored hash is unreadable
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid password hash: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::Internal(anyhow::anyhow!(
            "password verification failed: {}",
            e
        ))),
    }
}

/// SHA-256 digest of a one-time secret, base64url encoded
pub fn hash_secret(secret: &str) -> String {
    use base64::{Engine as _, engine::general_purpose};
    use sha2::{Digest, Sha256};

    let digest = Sha256::digest(secret.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// Random URL-safe token for password reset links
pub fn generate_reset_token() -> String {
    use base64::{Engine as _, engine::general_purpose};
    use rand::RngCore;

    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

//! Multipart image reading shared by avatar and post uploads

use axum::extract::multipart::Field;

use crate::error::AppError;
use crate::service::ImageUpload;
use crate::storage::{MAX_IMAGE_UPLOAD_BYTES, image_extension};

/// Read one multipart field as an image, enforcing type and size limits.
pub(crate) async fn read_image_field(mut field: Field<'_>) -> Result<ImageUpload, AppError> {
    let content_type = field
        .content_type()
        .map(|s| s.to_string())
        .ok_or(AppError::Validation(
            "Missing content type for uploaded file".to_string(),
        ))?;
    if image_extension(&content_type).is_none() {
        return Err(AppError::Validation(format!(
            "Unsupported MIME type: {}",
            content_type
        )));
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read file: {}", e)))?
    {
        if bytes.len() + chunk.len() > MAX_IMAGE_UPLOAD_BYTES {
            return Err(AppError::Validation(format!(
                "File too large: exceeds {} bytes",
                MAX_IMAGE_UPLOAD_BYTES
            )));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(ImageUpload {
        data: bytes,
        content_type,
    })
}

/// Read a text field
pub(crate) async fn read_text_field(field: Field<'_>, name: &str) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read {}: {}", name, e)))
}

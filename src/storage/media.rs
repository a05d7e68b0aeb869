//! Media storage for avatars and post images
//!
//! Two backends share one interface:
//! - Cloudflare R2 (S3-compatible), files served via Custom Domain
//! - A local directory, files served by the app under `/media`

use std::path::{Path, PathBuf};

use aws_sdk_s3::Client as S3Client;

use crate::config::{CloudflareConfig, MediaBackend, MediaStorageConfig};
use crate::error::AppError;

/// Largest accepted image upload
pub const MAX_IMAGE_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// File extension for an accepted image MIME type
///
/// Returns `None` for anything other than jpeg, png, gif and webp.
pub fn image_extension(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

enum Backend {
    R2 {
        /// S3-compatible client for R2
        client: S3Client,
        /// Media bucket name
        bucket: String,
    },
    Local {
        root: PathBuf,
    },
}

/// Media storage service
///
/// Stores image bytes under generated keys and returns public URLs.
pub struct MediaStorage {
    backend: Backend,
    /// Public URL base, without trailing slash
    public_url: String,
}

impl MediaStorage {
    /// Create new media storage client
    ///
    /// # Arguments
    /// * `config` - Media storage configuration
    /// * `cloudflare` - Cloudflare credentials (r2 backend only)
    ///
    /// # Errors
    /// Returns error if the r2 backend lacks credentials or the local root
    /// cannot be created
    pub async fn new(
        config: &MediaStorageConfig,
        cloudflare: Option<&CloudflareConfig>,
    ) -> Result<Self, AppError> {
        let public_url = config.public_url.trim_end_matches('/').to_string();

        let backend = match config.backend {
            MediaBackend::R2 => {
                let cloudflare = cloudflare.ok_or_else(|| {
                    AppError::Config(
                        "cloudflare credentials are required for the r2 media backend".to_string(),
                    )
                })?;
                Backend::R2 {
                    client: build_r2_client(cloudflare),
                    bucket: config.bucket.clone(),
                }
            }
            MediaBackend::Local => {
                tokio::fs::create_dir_all(&config.local_root)
                    .await
                    .map_err(|e| {
                        AppError::Storage(format!("failed to create media directory: {}", e))
                    })?;
                Backend::Local {
                    root: config.local_root.clone(),
                }
            }
        };

        Ok(Self {
            backend,
            public_url,
        })
    }

    /// Local media root, if this storage writes to disk
    pub fn local_root(&self) -> Option<&Path> {
        match &self.backend {
            Backend::Local { root } => Some(root),
            Backend::R2 { .. } => None,
        }
    }

    /// Upload media file
    ///
    /// # Arguments
    /// * `key` - Storage key (path) for the file
    /// * `data` - File contents
    /// * `content_type` - MIME type
    ///
    /// # Returns
    /// Public URL for the uploaded file
    pub async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AppError> {
        let size = data.len();

        match &self.backend {
            Backend::R2 { client, bucket } => {
                use aws_sdk_s3::primitives::ByteStream;

                client
                    .put_object()
                    .bucket(bucket)
                    .key(key)
                    .body(ByteStream::from(data))
                    .content_type(content_type)
                    .cache_control("public, max-age=31536000") // 1 year
                    .send()
                    .await
                    .map_err(|e| AppError::Storage(format!("R2 upload failed: {}", e)))?;
            }
            Backend::Local { root } => {
                let path = local_path(root, key)?;
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| AppError::Storage(format!("local upload failed: {}", e)))?;
                }
                tokio::fs::write(&path, data)
                    .await
                    .map_err(|e| AppError::Storage(format!("local upload failed: {}", e)))?;
            }
        }

        crate::metrics::MEDIA_BYTES_UPLOADED.inc_by(size as f64);
        tracing::debug!(key = %key, size, "Media stored");

        Ok(self.get_public_url(key))
    }

    /// Upload avatar image
    ///
    /// Stores in avatars/ prefix.
    ///
    /// # Returns
    /// (storage key, public URL)
    pub async fn upload_avatar(
        &self,
        id: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(String, String), AppError> {
        let ext = image_extension(content_type)
            .ok_or_else(|| AppError::Validation(format!("Unsupported MIME type: {}", content_type)))?;
        let key = format!("avatars/{}.{}", id, ext);
        let url = self.upload(&key, data, content_type).await?;
        crate::metrics::MEDIA_UPLOADS_TOTAL
            .with_label_values(&["avatar"])
            .inc();
        Ok((key, url))
    }

    /// Upload post image
    ///
    /// Stores in posts/ prefix.
    ///
    /// # Returns
    /// (storage key, public URL)
    pub async fn upload_post_image(
        &self,
        id: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(String, String), AppError> {
        let ext = image_extension(content_type)
            .ok_or_else(|| AppError::Validation(format!("Unsupported MIME type: {}", content_type)))?;
        let key = format!("posts/{}.{}", id, ext);
        let url = self.upload(&key, data, content_type).await?;
        crate::metrics::MEDIA_UPLOADS_TOTAL
            .with_label_values(&["post"])
            .inc();
        Ok((key, url))
    }

    /// Delete media file
    ///
    /// Deleting a key that does not exist is not an error.
    pub async fn delete(&self, key: &str) -> Result<(), AppError> {
        match &self.backend {
            Backend::R2 { client, bucket } => {
                client
                    .delete_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| AppError::Storage(format!("R2 delete failed: {}", e)))?;
            }
            Backend::Local { root } => {
                let path = local_path(root, key)?;
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                    Err(error) => {
                        return Err(AppError::Storage(format!("local delete failed: {}", error)));
                    }
                }
            }
        }

        tracing::debug!(key = %key, "Media deleted");
        Ok(())
    }

    /// Get public URL for a storage key
    pub fn get_public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, key)
    }
}

fn build_r2_client(cloudflare: &CloudflareConfig) -> S3Client {
    use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

    // R2 endpoint: https://{account_id}.r2.cloudflarestorage.com
    let endpoint = format!("https://{}.r2.cloudflarestorage.com", cloudflare.account_id);

    let credentials = Credentials::new(
        &cloudflare.r2_access_key_id,
        &cloudflare.r2_secret_access_key,
        None,
        None,
        "tweetapp-r2",
    );

    let s3_config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("auto"))
        .endpoint_url(&endpoint)
        .credentials_provider(credentials)
        .http_client(super::build_r2_http_client())
        .build();

    S3Client::from_conf(s3_config)
}

/// Resolve a key under the local root, rejecting anything that could escape it.
fn local_path(root: &Path, key: &str) -> Result<PathBuf, AppError> {
    let escapes = key.starts_with('/')
        || key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if escapes {
        return Err(AppError::Storage(format!("invalid media key: {}", key)));
    }
    Ok(root.join(key))
}

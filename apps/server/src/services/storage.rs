//! Object storage for bet-slip images.
//!
//! Supports both AWS S3 and MinIO for development.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use chrono::{DateTime, Datelike, Utc};
use tracing::info;
use uuid::Uuid;

use crate::config::StorageSettings;
use crate::error::{AppError, AppResult};

/// Content types accepted for bet-slip photos.
pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/heic"];

/// Durable store for submitted images.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store the bytes and return an opaque reference.
    async fn put(&self, data: Vec<u8>, content_type: &str) -> AppResult<String>;

    /// Fetch a stored image. Missing objects surface as `AppError::NotFound`.
    async fn get(&self, image_ref: &str) -> AppResult<Vec<u8>>;
}

/// File extension for an allowed image content type.
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// Build the object key for a new image.
///
/// Format: bet-slips/{yyyy}/{mm}/{uuid}.{ext}
pub fn image_key(id: Uuid, content_type: &str, now: DateTime<Utc>) -> String {
    let ext = extension_for_content_type(content_type).unwrap_or("bin");
    format!("bet-slips/{:04}/{:02}/{}.{}", now.year(), now.month(), id, ext)
}

/// S3 storage client wrapper.
#[derive(Clone)]
pub struct S3ImageStore {
    client: Client,
    bucket: String,
}

impl S3ImageStore {
    /// Create a new S3 storage client from configuration.
    pub async fn new(config: &StorageSettings) -> AppResult<Self> {
        let credentials =
            Credentials::new(&config.access_key, &config.secret_key, None, None, "intake");

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true); // Required for MinIO

        if let Some(ref endpoint) = config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let store = Self {
            client: Client::from_conf(s3_config_builder.build()),
            bucket: config.bucket.clone(),
        };

        store.ensure_bucket_exists().await?;

        info!("S3 image store initialized: bucket={}", config.bucket);

        Ok(store)
    }

    async fn ensure_bucket_exists(&self) -> AppResult<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    info!("Creating S3 bucket '{}'", self.bucket);
                    self.client
                        .create_bucket()
                        .bucket(&self.bucket)
                        .send()
                        .await
                        .map_err(|e| {
                            AppError::Storage(format!("Failed to create bucket: {}", e))
                        })?;
                    Ok(())
                } else {
                    Err(AppError::Storage(format!(
                        "Failed to access bucket '{}': {}",
                        self.bucket, service_error
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    async fn put(&self, data: Vec<u8>, content_type: &str) -> AppResult<String> {
        let key = image_key(Uuid::new_v4(), content_type, Utc::now());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(aws_sdk_s3::primitives::ByteStream::from(data))
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to upload image to S3: {}", e)))?;

        Ok(key)
    }

    async fn get(&self, image_ref: &str) -> AppResult<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(image_ref)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    AppError::NotFound(format!("Image not found: {}", image_ref))
                } else {
                    AppError::Storage(format!("Failed to get image from S3: {}", service_error))
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to read S3 response body: {}", e)))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }
}

use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Upload URLs stay valid for ten minutes.
const UPLOAD_URL_TTL: Duration = Duration::from_secs(600);

/// MIME types accepted for content media (prefix match).
pub const ALLOWED_MEDIA_TYPES: [&str; 4] = ["image/", "audio/", "video/", "application/pdf"];

/// StorageService
///
/// Object storage for content media (cover images, guided audio, exercise videos).
/// The admin UI uploads directly to the bucket through a presigned URL and stores the
/// returned key as the content item's `media_key`.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the bucket if needed. Used at local startup against MinIO.
    async fn ensure_bucket_exists(&self);

    /// A time-limited PUT URL for `key`, constrained to `content_type`.
    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, String>;
}

pub fn is_allowed_media_type(content_type: &str) -> bool {
    let content_type = content_type.trim().to_ascii_lowercase();
    ALLOWED_MEDIA_TYPES
        .iter()
        .any(|prefix| content_type.starts_with(prefix))
}

/// media_key_for
///
/// Builds a fresh object key (`content/{uuid}.{ext}`) from the uploaded file's name.
/// Only the sanitized extension of the client-supplied name is kept.
pub fn media_key_for(filename: &str) -> String {
    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .map(|ext| {
            ext.chars()
                .filter(char::is_ascii_alphanumeric)
                .take(8)
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| "bin".to_string());
    format!("content/{}.{}", Uuid::new_v4(), extension)
}

/// S3StorageClient
///
/// `StorageService` over any S3-compatible endpoint (MinIO locally, S3 in production).
/// Path-style addressing is forced for MinIO compatibility.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            // Already-exists errors land here too.
            tracing::debug!("create_bucket({}) returned: {:?}", self.bucket_name, e);
        }
    }

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, String> {
        let presigning = PresigningConfig::expires_in(UPLOAD_URL_TTL).map_err(|e| e.to_string())?;

        let presigned_req = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| e.to_string())?;

        Ok(presigned_req.uri().to_string())
    }
}

/// Removes `.`/`..` and empty segments from an object key.
fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// MockStorageService
///
/// Deterministic `StorageService` for tests and memory-backed local runs.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, every presign call fails.
    pub should_fail: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        _content_type: &str,
    ) -> Result<String, String> {
        if self.should_fail {
            return Err("mock storage failure".to_string());
        }
        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?signature=fake",
            sanitize_key(key)
        ))
    }
}

pub type StorageState = Arc<dyn StorageService>;

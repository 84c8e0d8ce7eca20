//! S3-compatible object store (AWS S3, Cloudflare R2, MinIO, ...).
//!
//! Uploads go through an [`opendal::Operator`] backed by the S3 service, with
//! path-style addressing against the configured endpoint.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use opendal::layers::TimeoutLayer;
use opendal::services::S3;
use opendal::Operator;
use reqwest::Url;
use serde::Deserialize;

use super::{BlobStore, StoreError};

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_provider() -> String {
    "S3".to_string()
}

/// Contents of the credentials JSON file.
#[derive(Clone, Deserialize)]
pub struct S3Credentials {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub endpoint_url: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("provider", &self.provider)
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .finish()
    }
}

impl S3Credentials {
    /// Load credentials from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Credentials file not found at {}", path.display()))?;
        let creds: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Credentials file '{}' is invalid", path.display()))?;
        if creds.bucket.is_empty() {
            anyhow::bail!("Credentials file '{}' has an empty bucket", path.display());
        }
        Ok(creds)
    }
}

pub struct S3Store {
    op: Operator,
    credentials: S3Credentials,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("endpoint", &self.credentials.endpoint_url)
            .field("bucket", &self.credentials.bucket)
            .finish_non_exhaustive()
    }
}

impl S3Store {
    /// `timeout` bounds each request made to the bucket.
    pub fn new(credentials: S3Credentials, timeout: Duration) -> Result<Self, StoreError> {
        let invalid = |reason: String| StoreError::InvalidEndpoint {
            endpoint: credentials.endpoint_url.clone(),
            reason,
        };
        let endpoint = Url::parse(&credentials.endpoint_url).map_err(|e| invalid(e.to_string()))?;
        if endpoint.host_str().is_none() {
            return Err(invalid("missing host".into()));
        }
        if endpoint.query().is_some() {
            return Err(invalid("query strings are not supported".into()));
        }

        // Only the credentials file counts: no environment, profile or
        // instance-metadata fallbacks.
        let builder = S3::default()
            .endpoint(credentials.endpoint_url.trim_end_matches('/'))
            .region(&credentials.region)
            .bucket(&credentials.bucket)
            .access_key_id(&credentials.access_key)
            .secret_access_key(&credentials.secret_key)
            .disable_config_load()
            .disable_ec2_metadata();
        let op = Operator::new(builder)
            .map_err(|e| invalid(e.to_string()))?
            .layer(TimeoutLayer::new().with_timeout(timeout))
            .finish();

        Ok(Self { op, credentials })
    }
}

#[async_trait]
impl BlobStore for S3Store {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StoreError> {
        if key.is_empty() || key.ends_with('/') {
            return Err(StoreError::InvalidKey(key.to_string()));
        }

        tracing::debug!(
            key = %key,
            bucket = %self.credentials.bucket,
            bytes = bytes.len(),
            "Uploading object"
        );
        self.op
            .write_with(key, bytes)
            .content_type(content_type_for(key))
            .await
            .map_err(|source| StoreError::Backend {
                key: key.to_string(),
                source,
            })?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "bucket '{}' on {}",
            self.credentials.bucket, self.credentials.provider
        )
    }
}

fn content_type_for(key: &str) -> &'static str {
    let ext = Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "heic" => "image/heic",
        "png" => "image/png",
        "gif" => "image/gif",
        "mov" => "video/quicktime",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

//! Destination object stores.

pub mod error;
pub mod local;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;

pub use self::error::StoreError;
pub use self::local::LocalDirStore;
pub use self::s3::{S3Credentials, S3Store};

/// Destination of synchronized photos. `put` overwrites silently; the object
/// key is the item id.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StoreError>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

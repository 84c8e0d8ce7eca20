//! Photo sources: the remote side of the sync.
//!
//! A [`PhotoSource`] resolves an album by name; the album then yields a fresh,
//! lazy enumeration of [`RemoteItem`]s on every call to [`Album::items`]. Item
//! bytes are only fetched when the transfer pipeline asks for them.

pub mod error;
pub mod local;
pub mod shared_stream;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

pub use self::error::SourceError;
pub use self::local::LocalDirSource;
pub use self::shared_stream::SharedStreamSource;

/// Lazy, finite enumeration of an album's items. Not restartable; ask the
/// album for a new one each scan.
pub type ItemStream<'a> = BoxStream<'a, Result<Box<dyn RemoteItem>, SourceError>>;

/// One remote photo. The id is the stable filename used as ledger entry and
/// object key.
#[async_trait]
pub trait RemoteItem: Send + Sync {
    fn id(&self) -> &str;

    /// Size in bytes if the source knows it before fetching.
    fn size_hint(&self) -> Option<u64> {
        None
    }

    async fn fetch_original(&self) -> Result<Bytes, SourceError>;
}

/// A resolved album.
pub trait Album: Send + Sync {
    fn name(&self) -> &str;

    fn items(&self) -> ItemStream<'_>;
}

/// Capability that can look up albums by name.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// Resolve `name` to an album. Returns [`SourceError::AlbumNotFound`] when
    /// the album was renamed, deleted or access was revoked.
    async fn resolve_album(&self, name: &str) -> Result<Box<dyn Album>, SourceError>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

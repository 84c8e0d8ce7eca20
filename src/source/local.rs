//! Directory-backed photo source: each sub-directory of the root is an album
//! and each regular file inside it is an item.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use tokio::fs::ReadDir;

use super::{Album, ItemStream, PhotoSource, RemoteItem, SourceError};

#[derive(Debug, Clone)]
pub struct LocalDirSource {
    root: PathBuf,
}

impl LocalDirSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl PhotoSource for LocalDirSource {
    async fn resolve_album(&self, name: &str) -> Result<Box<dyn Album>, SourceError> {
        if !is_single_component(name) {
            return Err(SourceError::AlbumNotFound(name.to_string()));
        }
        let path = self.root.join(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(Box::new(LocalAlbum {
                name: name.to_string(),
                path,
            })),
            Ok(_) => Err(SourceError::AlbumNotFound(name.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SourceError::AlbumNotFound(name.to_string()))
            }
            Err(e) => Err(SourceError::Io(e)),
        }
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

fn is_single_component(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

struct LocalAlbum {
    name: String,
    path: PathBuf,
}

impl Album for LocalAlbum {
    fn name(&self) -> &str {
        &self.name
    }

    fn items(&self) -> ItemStream<'_> {
        let dir = self.path.clone();
        stream::once(async move { tokio::fs::read_dir(&dir).await })
            .flat_map(|result| match result {
                Ok(read_dir) => directory_entries(read_dir).boxed(),
                Err(e) => stream::iter([Err(SourceError::Io(e))]).boxed(),
            })
            .boxed()
    }
}

/// Yield regular, non-hidden files in directory order. Stops after the first
/// I/O error.
fn directory_entries(
    read_dir: ReadDir,
) -> impl Stream<Item = Result<Box<dyn RemoteItem>, SourceError>> + Send {
    stream::unfold(Some(read_dir), |state| async move {
        let mut read_dir = state?;
        loop {
            let entry = match read_dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => return None,
                Err(e) => return Some((Err(SourceError::Io(e)), None)),
            };
            match local_item(entry.path()).await {
                Ok(Some(item)) => return Some((Ok(item), Some(read_dir))),
                Ok(None) => continue,
                Err(e) => return Some((Err(e), None)),
            }
        }
    })
}

async fn local_item(path: PathBuf) -> Result<Option<Box<dyn RemoteItem>>, SourceError> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        tracing::warn!(path = %path.display(), "Skipping file with non UTF-8 name");
        return Ok(None);
    };
    if name.starts_with('.') {
        return Ok(None);
    }
    let meta = tokio::fs::metadata(&path).await?;
    if !meta.is_file() {
        return Ok(None);
    }
    Ok(Some(Box::new(LocalItem {
        id: name.to_string(),
        size: meta.len(),
        path,
    })))
}

struct LocalItem {
    id: String,
    path: PathBuf,
    size: u64,
}

impl LocalItem {
    fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RemoteItem for LocalItem {
    fn id(&self) -> &str {
        &self.id
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.size)
    }

    async fn fetch_original(&self) -> Result<Bytes, SourceError> {
        let data = tokio::fs::read(self.path()).await?;
        Ok(Bytes::from(data))
    }
}

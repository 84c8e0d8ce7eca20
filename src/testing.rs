//! In-memory fakes for the sync collaborators.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};

use crate::notify::{Notifier, NotifyError};
use crate::source::{Album, ItemStream, PhotoSource, RemoteItem, SourceError};
use crate::store::{BlobStore, StoreError};

type Recorder = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone)]
enum Fetch {
    Bytes(Bytes),
    Fail,
    Panic,
}

/// Description of one photo served by [`FakeSource`].
#[derive(Debug, Clone)]
pub(crate) struct FakePhoto {
    id: String,
    fetch: Fetch,
}

impl FakePhoto {
    pub(crate) fn new(id: &str, bytes: &[u8]) -> Self {
        Self {
            id: id.to_string(),
            fetch: Fetch::Bytes(Bytes::copy_from_slice(bytes)),
        }
    }

    /// Fetch fails with a non-retryable error.
    pub(crate) fn unfetchable(id: &str) -> Self {
        Self {
            id: id.to_string(),
            fetch: Fetch::Fail,
        }
    }

    /// Fetch panics.
    pub(crate) fn panicking(id: &str) -> Self {
        Self {
            id: id.to_string(),
            fetch: Fetch::Panic,
        }
    }

    pub(crate) fn into_item(self) -> Box<dyn RemoteItem> {
        Box::new(FakeItem {
            photo: self,
            fetches: Recorder::default(),
        })
    }
}

struct FakeItem {
    photo: FakePhoto,
    fetches: Recorder,
}

#[async_trait]
impl RemoteItem for FakeItem {
    fn id(&self) -> &str {
        &self.photo.id
    }

    fn size_hint(&self) -> Option<u64> {
        match &self.photo.fetch {
            Fetch::Bytes(b) => Some(b.len() as u64),
            _ => None,
        }
    }

    async fn fetch_original(&self) -> Result<Bytes, SourceError> {
        self.fetches.lock().unwrap().push(self.photo.id.clone());
        match &self.photo.fetch {
            Fetch::Bytes(b) => Ok(b.clone()),
            Fetch::Fail => Err(SourceError::HttpStatus {
                status: 410,
                url: format!("https://fake/{}", self.photo.id),
            }),
            Fetch::Panic => panic!("simulated crash while fetching {}", self.photo.id),
        }
    }
}

/// Photo source serving a single album from memory and recording fetches.
pub(crate) struct FakeSource {
    album: String,
    photos: Vec<FakePhoto>,
    available: bool,
    fail_listing_after: Option<usize>,
    fetches: Recorder,
}

impl FakeSource {
    pub(crate) fn new(album: &str, photos: Vec<FakePhoto>) -> Self {
        Self {
            album: album.to_string(),
            photos,
            available: true,
            fail_listing_after: None,
            fetches: Recorder::default(),
        }
    }

    /// Every album lookup fails with `AlbumNotFound`.
    pub(crate) fn unavailable(album: &str) -> Self {
        Self {
            available: false,
            ..Self::new(album, Vec::new())
        }
    }

    /// The listing yields `n` items, then an error.
    pub(crate) fn fail_listing_after(mut self, n: usize) -> Self {
        self.fail_listing_after = Some(n);
        self
    }

    /// Ids fetched so far, in order.
    pub(crate) fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl PhotoSource for FakeSource {
    async fn resolve_album(&self, name: &str) -> Result<Box<dyn Album>, SourceError> {
        if !self.available || name != self.album {
            return Err(SourceError::AlbumNotFound(name.to_string()));
        }
        Ok(Box::new(FakeAlbum {
            name: self.album.clone(),
            photos: self.photos.clone(),
            fail_listing_after: self.fail_listing_after,
            fetches: self.fetches.clone(),
        }))
    }

    fn describe(&self) -> String {
        "fake source".to_string()
    }
}

struct FakeAlbum {
    name: String,
    photos: Vec<FakePhoto>,
    fail_listing_after: Option<usize>,
    fetches: Recorder,
}

impl Album for FakeAlbum {
    fn name(&self) -> &str {
        &self.name
    }

    fn items(&self) -> ItemStream<'_> {
        let mut results: Vec<Result<Box<dyn RemoteItem>, SourceError>> = self
            .photos
            .iter()
            .map(|photo| {
                Ok(Box::new(FakeItem {
                    photo: photo.clone(),
                    fetches: self.fetches.clone(),
                }) as Box<dyn RemoteItem>)
            })
            .collect();
        if let Some(n) = self.fail_listing_after {
            results.truncate(n);
            results.push(Err(SourceError::Protocol("listing interrupted".into())));
        }
        stream::iter(results).boxed()
    }
}

/// Object store keeping objects in memory and recording every put attempt.
#[derive(Default)]
pub(crate) struct RecordingStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
    attempts: Mutex<Vec<String>>,
    fail_all: AtomicBool,
    failing_keys: HashSet<String>,
    transient_failures: AtomicU32,
}

impl RecordingStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every put fails with a non-retryable permission error until [`Self::recover`].
    pub(crate) fn failing() -> Self {
        Self {
            fail_all: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub(crate) fn failing_keys(keys: &[&str]) -> Self {
        Self {
            failing_keys: keys.iter().map(|k| k.to_string()).collect(),
            ..Self::default()
        }
    }

    /// The first `n` puts fail with a temporary error.
    pub(crate) fn flaky(n: u32) -> Self {
        Self {
            transient_failures: AtomicU32::new(n),
            ..Self::default()
        }
    }

    pub(crate) fn recover(&self) {
        self.fail_all.store(false, Ordering::SeqCst);
    }

    pub(crate) fn put_attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub(crate) fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// Stored keys, sorted.
    pub(crate) fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl BlobStore for RecordingStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StoreError> {
        self.attempts.lock().unwrap().push(key.to_string());

        let transient = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let error = if transient {
            Some(
                opendal::Error::new(opendal::ErrorKind::Unexpected, "simulated failure")
                    .set_temporary(),
            )
        } else if self.fail_all.load(Ordering::SeqCst) || self.failing_keys.contains(key) {
            Some(opendal::Error::new(
                opendal::ErrorKind::PermissionDenied,
                "simulated failure",
            ))
        } else {
            None
        };
        if let Some(source) = error {
            return Err(StoreError::Backend {
                key: key.to_string(),
                source,
            });
        }

        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    fn describe(&self) -> String {
        "recording store".to_string()
    }
}

/// Notifier that records every message, optionally failing each send.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        self.messages.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(NotifyError::Rejected {
                status: 502,
                description: "simulated outage".into(),
            });
        }
        Ok(())
    }
}

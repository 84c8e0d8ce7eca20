//! iCloud public shared album ("web stream") source.
//!
//! Shared albums published as a public website can be read without account
//! authentication: `webstream` lists the photos and their derivatives, and
//! `webasseturls` turns derivative checksums into short-lived CDN URLs. The
//! first request may answer HTTP 330 with the partition host the album
//! actually lives on.
//!
//! A listing resolves URLs only to learn each photo's filename. The URL used
//! for the download is requested again right before the fetch, since the
//! listing's URLs may have expired by the time a long run reaches the item.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Album, ItemStream, PhotoSource, RemoteItem, SourceError};

const BASE62: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Apple's "moved to another partition" status.
const PARTITION_REDIRECT: u16 = 330;

const MME_HOST_HEADER: &str = "X-Apple-MMe-Host";

/// `webasseturls` accepts a bounded number of guids per request.
const ASSET_URL_BATCH: usize = 25;

pub struct SharedStreamSource {
    client: Client,
    base_url: Url,
}

impl std::fmt::Debug for SharedStreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStreamSource")
            .field("host", &self.base_url.host_str())
            .field("token", &"<redacted>")
            .finish()
    }
}

impl SharedStreamSource {
    /// Build a source for the shared album identified by `token`.
    pub fn new(client: Client, token: &str) -> Result<Self, SourceError> {
        let partition = server_partition(token)
            .ok_or_else(|| SourceError::Protocol(format!("malformed share token {token:?}")))?;
        let base = format!(
            "https://p{partition:02}-sharedstreams.icloud.com/{token}/sharedstreams/"
        );
        Self::with_base_url(client, &base)
    }

    /// Build a source against an explicit `.../sharedstreams/` base URL.
    pub fn with_base_url(client: Client, base: &str) -> Result<Self, SourceError> {
        let mut base_url = Url::parse(base)
            .map_err(|e| SourceError::Protocol(format!("invalid base URL {base}: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    /// Fetch the album listing, following at most one partition redirect.
    /// Returns the listing with the base URL that served it.
    async fn fetch_stream(&self) -> Result<(Url, WebStream), SourceError> {
        let mut base = self.base_url.clone();
        // One hop is all Apple ever asks for; a second 330 is a protocol error.
        for _ in 0..2 {
            let url = join(&base, "webstream")?;
            let response = post_json(&self.client, &url, &json!({ "streamCtag": null })).await?;
            let status = response.status();

            if status.as_u16() == PARTITION_REDIRECT {
                let header_host = response
                    .headers()
                    .get(MME_HOST_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let host = match header_host {
                    Some(host) => host,
                    None => {
                        let body: Value = read_json(response, &url).await?;
                        body[MME_HOST_HEADER]
                            .as_str()
                            .map(str::to_owned)
                            .ok_or_else(|| {
                                SourceError::Protocol("330 without partition host".into())
                            })?
                    }
                };
                tracing::debug!(host = %host, "Shared album lives on another partition");
                base = redirect_base(&base, &host)?;
                continue;
            }

            if matches!(
                status,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
            ) {
                return Err(SourceError::AlbumNotFound(url.to_string()));
            }
            if !status.is_success() {
                return Err(SourceError::HttpStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
            let stream: WebStream = read_json(response, &url).await?;
            return Ok((base, stream));
        }
        Err(SourceError::Protocol("too many partition redirects".into()))
    }
}

#[async_trait]
impl PhotoSource for SharedStreamSource {
    async fn resolve_album(&self, name: &str) -> Result<Box<dyn Album>, SourceError> {
        let (base, stream) = match self.fetch_stream().await {
            Err(SourceError::AlbumNotFound(_)) => {
                return Err(SourceError::AlbumNotFound(name.to_string()))
            }
            other => other?,
        };
        if stream.stream_name.as_deref() != Some(name) {
            tracing::warn!(
                expected = %name,
                found = ?stream.stream_name,
                "Shared album name does not match"
            );
            return Err(SourceError::AlbumNotFound(name.to_string()));
        }
        tracing::debug!(album = %name, photos = stream.photos.len(), "Shared album resolved");
        Ok(Box::new(SharedAlbum {
            name: name.to_string(),
            client: self.client.clone(),
            base,
            photos: stream.photos,
        }))
    }

    fn describe(&self) -> String {
        format!(
            "iCloud shared album on {}",
            self.base_url.host_str().unwrap_or("?")
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebStream {
    stream_name: Option<String>,
    #[serde(default)]
    photos: Vec<StreamPhoto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamPhoto {
    photo_guid: String,
    #[serde(default)]
    derivatives: HashMap<String, Derivative>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Derivative {
    checksum: String,
    #[serde(default)]
    file_size: Value,
}

impl Derivative {
    /// Apple sends sizes as strings; accept numbers too.
    fn size(&self) -> u64 {
        match &self.file_size {
            Value::String(s) => s.parse().unwrap_or(0),
            Value::Number(n) => n.as_u64().unwrap_or(0),
            _ => 0,
        }
    }
}

impl StreamPhoto {
    /// The original is the largest derivative.
    fn original(&self) -> Option<&Derivative> {
        self.derivatives.values().max_by_key(|d| d.size())
    }
}

#[derive(Debug, Deserialize)]
struct AssetUrls {
    #[serde(default)]
    items: HashMap<String, AssetUrl>,
}

#[derive(Debug, Deserialize)]
struct AssetUrl {
    url_location: String,
    url_path: String,
}

impl AssetUrl {
    /// CDN URL, served over the same scheme as the album API.
    fn download_url(&self, scheme: &str) -> String {
        format!("{scheme}://{}{}", self.url_location, self.url_path)
    }

    /// Last path segment without query string; this is the photo's filename.
    fn filename(&self) -> Option<&str> {
        let path = self.url_path.split('?').next().unwrap_or("");
        path.rsplit('/').next().filter(|s| !s.is_empty())
    }
}

struct SharedAlbum {
    name: String,
    client: Client,
    base: Url,
    photos: Vec<StreamPhoto>,
}

impl SharedAlbum {
    async fn resolve_page(
        &self,
        page: Vec<StreamPhoto>,
    ) -> Result<Vec<Box<dyn RemoteItem>>, SourceError> {
        let guids: Vec<&str> = page.iter().map(|p| p.photo_guid.as_str()).collect();
        let mut urls = asset_urls(&self.client, &self.base, &guids).await?;

        let mut items: Vec<Box<dyn RemoteItem>> = Vec::with_capacity(page.len());
        for photo in page {
            let Some(original) = photo.original() else {
                tracing::warn!(guid = %photo.photo_guid, "Photo has no derivatives, skipping");
                continue;
            };
            let Some(asset) = urls.items.remove(&original.checksum) else {
                tracing::warn!(guid = %photo.photo_guid, "No download URL returned, skipping");
                continue;
            };
            let id = asset
                .filename()
                .map(str::to_owned)
                .unwrap_or_else(|| photo.photo_guid.clone());
            items.push(Box::new(SharedItem {
                id,
                guid: photo.photo_guid.clone(),
                checksum: original.checksum.clone(),
                size: original.size(),
                base: self.base.clone(),
                client: self.client.clone(),
            }));
        }
        Ok(items)
    }
}

impl Album for SharedAlbum {
    fn name(&self) -> &str {
        &self.name
    }

    fn items(&self) -> ItemStream<'_> {
        let pages: Vec<Vec<StreamPhoto>> = self
            .photos
            .chunks(ASSET_URL_BATCH)
            .map(<[StreamPhoto]>::to_vec)
            .collect();
        stream::iter(pages)
            .then(move |page| self.resolve_page(page))
            .flat_map(|page| match page {
                Ok(items) => stream::iter(items.into_iter().map(Ok).collect::<Vec<_>>()),
                Err(e) => stream::iter(vec![Err(e)]),
            })
            .boxed()
    }
}

struct SharedItem {
    id: String,
    guid: String,
    checksum: String,
    size: u64,
    base: Url,
    client: Client,
}

impl SharedItem {
    async fn download_url(&self) -> Result<String, SourceError> {
        let mut urls = asset_urls(&self.client, &self.base, &[self.guid.as_str()]).await?;
        let asset = urls.items.remove(&self.checksum).ok_or_else(|| {
            SourceError::Protocol(format!("no download URL for photo {}", self.guid))
        })?;
        Ok(asset.download_url(self.base.scheme()))
    }
}

#[async_trait]
impl RemoteItem for SharedItem {
    fn id(&self) -> &str {
        &self.id
    }

    fn size_hint(&self) -> Option<u64> {
        (self.size > 0).then_some(self.size)
    }

    async fn fetch_original(&self) -> Result<Bytes, SourceError> {
        let url = self.download_url().await?;
        let http_err = |source| SourceError::Http {
            url: url.clone(),
            source,
        };
        let response = self.client.get(&url).send().await.map_err(http_err)?;
        if !response.status().is_success() {
            return Err(SourceError::HttpStatus {
                status: response.status().as_u16(),
                url: url.clone(),
            });
        }
        response.bytes().await.map_err(http_err)
    }
}

/// Ask `webasseturls` for the CDN locations of `guids`, keyed by derivative
/// checksum.
async fn asset_urls(client: &Client, base: &Url, guids: &[&str]) -> Result<AssetUrls, SourceError> {
    let url = join(base, "webasseturls")?;
    let response = post_json(client, &url, &json!({ "photoGuids": guids })).await?;
    if !response.status().is_success() {
        return Err(SourceError::HttpStatus {
            status: response.status().as_u16(),
            url: url.to_string(),
        });
    }
    read_json(response, &url).await
}

async fn post_json(
    client: &Client,
    url: &Url,
    body: &Value,
) -> Result<reqwest::Response, SourceError> {
    client
        .post(url.clone())
        .header(reqwest::header::CONTENT_TYPE, "text/plain")
        .body(body.to_string())
        .send()
        .await
        .map_err(|source| SourceError::Http {
            url: url.to_string(),
            source,
        })
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    url: &Url,
) -> Result<T, SourceError> {
    let text = response.text().await.map_err(|source| SourceError::Http {
        url: url.to_string(),
        source,
    })?;
    serde_json::from_str(&text)
        .map_err(|e| SourceError::Protocol(format!("invalid JSON from {url}: {e}")))
}

fn join(base: &Url, endpoint: &str) -> Result<Url, SourceError> {
    base.join(endpoint)
        .map_err(|e| SourceError::Protocol(format!("cannot build {endpoint} URL: {e}")))
}

fn redirect_base(base: &Url, host: &str) -> Result<Url, SourceError> {
    let mut url = base.clone();
    url.set_host(Some(host))
        .map_err(|e| SourceError::Protocol(format!("invalid partition host {host:?}: {e}")))?;
    Ok(url)
}

fn base62_value(c: u8) -> Option<u32> {
    BASE62.iter().position(|&b| b == c).map(|p| p as u32)
}

/// Partition number encoded in a share token: one base-62 digit after a
/// leading `A`, otherwise two.
fn server_partition(token: &str) -> Option<u32> {
    let bytes = token.as_bytes();
    match bytes {
        [b'A', d, ..] => base62_value(*d),
        [_, hi, lo, ..] => Some(base62_value(*hi)? * 62 + base62_value(*lo)?),
        _ => None,
    }
}

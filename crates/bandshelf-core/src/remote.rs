//! Remote-storage browsing for linked cloud accounts.
//!
//! This module provides:
//! - A thin client for the remote provider's folder-listing and
//!   temporary-link endpoints
//! - A lister that paginates transparently, filters to importable audio
//!   files, and caches listings per path for the session so sort direction
//!   can be re-applied without refetching
//!
//! Failures are classified so the caller can distinguish an expired
//! authorization (re-authenticate) from a transient network problem (retry).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::format::is_audio_file;

/// Default timeout for listing requests, in seconds.
pub const DEFAULT_LIST_TIMEOUT_SECS: u64 = 30;

/// Entry tag used by the remote API for folders.
const FOLDER_TAG: &str = "folder";

/// Sort direction for folder listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// A to Z (default).
    #[default]
    Ascending,
    /// Z to A.
    Descending,
}

/// A single entry returned by the remote listing API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawEntry {
    /// Entry kind tag (`"file"` or `"folder"`).
    #[serde(rename = ".tag")]
    pub tag: String,
    /// Display name of the entry.
    pub name: String,
    /// Lowercased full path of the entry.
    pub path_lower: Option<String>,
    /// Size in bytes (files only).
    #[serde(default)]
    pub size: Option<u64>,
    /// Server-side modification timestamp (files only).
    pub server_modified: Option<String>,
}

impl RawEntry {
    /// Check whether this entry is a folder.
    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.tag == FOLDER_TAG
    }
}

/// One page of a folder listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ListPage {
    /// Entries on this page.
    pub entries: Vec<RawEntry>,
    /// Continuation cursor for the next page.
    pub cursor: Option<String>,
    /// Whether more pages remain.
    pub has_more: bool,
}

/// A browsable entry surfaced to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Display name.
    pub name: String,
    /// Full remote path.
    pub path: String,
    /// Size in bytes (zero for folders).
    pub size_bytes: u64,
    /// Server-side modification timestamp, if reported.
    pub modified: Option<String>,
}

/// A folder listing partitioned into subfolders and importable audio files.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FolderListing {
    /// Subfolders, sorted by name.
    pub folders: Vec<RemoteEntry>,
    /// Audio files, sorted by name.
    pub files: Vec<RemoteEntry>,
}

impl FolderListing {
    /// Total number of entries in the listing.
    #[must_use]
    pub fn len(&self) -> usize {
        self.folders.len() + self.files.len()
    }

    /// Check whether the listing is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.files.is_empty()
    }
}

/// Raw access to the remote-storage provider.
///
/// The seam between the lister/orchestrator and the provider's HTTP API,
/// implemented over HTTP in production and by mocks in tests.
pub trait RemoteApi {
    /// Fetch the first page of a folder listing.
    async fn list_folder(&self, path: &str) -> Result<ListPage>;

    /// Fetch a continuation page.
    async fn list_folder_continue(&self, cursor: &str) -> Result<ListPage>;

    /// Resolve a short-lived playback/download URL for a remote file.
    ///
    /// The returned URL is time-limited; it must only be used as transient
    /// input for probing or transcoding, never persisted.
    async fn temporary_link(&self, path: &str) -> Result<String>;
}

/// HTTP implementation of [`RemoteApi`] using a bearer token.
pub struct HttpRemoteApi {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

#[derive(Debug, Serialize)]
struct ListFolderRequest<'a> {
    path: &'a str,
}

#[derive(Debug, Serialize)]
struct ListContinueRequest<'a> {
    cursor: &'a str,
}

#[derive(Debug, Serialize)]
struct TemporaryLinkRequest<'a> {
    path: &'a str,
}

#[derive(Debug, Deserialize)]
struct TemporaryLinkResponse {
    link: String,
}

impl HttpRemoteApi {
    /// Create a new client for the given API base URL and bearer token.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_LIST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    async fn post_json<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_listing_failure(status.as_u16(), &text, endpoint));
        }

        Ok(response.json::<T>().await?)
    }
}

/// Map a non-success listing response onto the error taxonomy.
fn classify_listing_failure(status: u16, body: &str, endpoint: &str) -> Error {
    match status {
        401 => Error::AuthExpired(format!("{endpoint} rejected the access token")),
        500..=599 => Error::network_error(format!("{endpoint} returned {status}: {body}")),
        _ => Error::Other(format!("{endpoint} returned {status}: {body}")),
    }
}

impl RemoteApi for HttpRemoteApi {
    async fn list_folder(&self, path: &str) -> Result<ListPage> {
        debug!("Listing remote folder: {:?}", path);
        self.post_json("list_folder", &ListFolderRequest { path })
            .await
    }

    async fn list_folder_continue(&self, cursor: &str) -> Result<ListPage> {
        self.post_json("list_folder/continue", &ListContinueRequest { cursor })
            .await
    }

    async fn temporary_link(&self, path: &str) -> Result<String> {
        debug!("Resolving temporary link for: {}", path);
        let response: TemporaryLinkResponse = self
            .post_json("get_temporary_link", &TemporaryLinkRequest { path })
            .await?;
        Ok(response.link)
    }
}

/// Folder lister with transparent pagination and a per-session cache.
///
/// Listings are cached per path in canonical ascending order; changing the
/// sort direction re-sorts from cache without another round trip. The cache
/// is owned by the lister and handed out only as cloned snapshots.
pub struct RemoteLister<A> {
    api: A,
    cache: HashMap<String, FolderListing>,
}

impl<A: RemoteApi> RemoteLister<A> {
    /// Create a new lister over the given API.
    pub fn new(api: A) -> Self {
        Self {
            api,
            cache: HashMap::new(),
        }
    }

    /// List a remote folder, partitioned into subfolders and audio files.
    ///
    /// Paginates until the API reports no more pages. Served from the
    /// session cache when the path was already listed.
    ///
    /// # Errors
    ///
    /// Returns an error if any page fetch fails; a partially fetched listing
    /// is never cached.
    pub async fn list(&mut self, path: &str, direction: SortDirection) -> Result<FolderListing> {
        if let Some(cached) = self.cache.get(path) {
            debug!("Serving listing for {:?} from cache", path);
            return Ok(apply_direction(cached.clone(), direction));
        }

        let listing = self.fetch_all(path).await?;
        info!(
            "Listed {:?}: {} folders, {} audio files",
            path,
            listing.folders.len(),
            listing.files.len()
        );
        self.cache.insert(path.to_string(), listing.clone());

        Ok(apply_direction(listing, direction))
    }

    /// Drop the cached listing for a path.
    pub fn invalidate(&mut self, path: &str) {
        self.cache.remove(path);
    }

    /// Drop all cached listings.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Check whether a path is currently cached.
    #[must_use]
    pub fn is_cached(&self, path: &str) -> bool {
        self.cache.contains_key(path)
    }

    async fn fetch_all(&self, path: &str) -> Result<FolderListing> {
        let mut entries = Vec::new();
        let mut page = self.api.list_folder(path).await?;

        loop {
            entries.append(&mut page.entries);
            if !page.has_more {
                break;
            }
            let cursor = page.cursor.ok_or_else(|| {
                Error::validation("listing reported more pages but carried no cursor")
            })?;
            page = self.api.list_folder_continue(&cursor).await?;
        }

        Ok(partition_entries(entries))
    }
}

/// Partition raw entries into folders and supported audio files, sorted
/// ascending case-insensitively.
fn partition_entries(entries: Vec<RawEntry>) -> FolderListing {
    let mut folders = Vec::new();
    let mut files = Vec::new();

    for entry in entries {
        let path = entry
            .path_lower
            .clone()
            .unwrap_or_else(|| entry.name.clone());

        if entry.is_folder() {
            folders.push(RemoteEntry {
                name: entry.name,
                path,
                size_bytes: 0,
                modified: None,
            });
        } else if is_audio_file(&entry.name) {
            files.push(RemoteEntry {
                name: entry.name,
                path,
                size_bytes: entry.size.unwrap_or(0),
                modified: entry.server_modified,
            });
        } else {
            debug!("Skipping unsupported entry: {}", entry.name);
        }
    }

    sort_entries(&mut folders);
    sort_entries(&mut files);

    FolderListing { folders, files }
}

fn sort_entries(entries: &mut [RemoteEntry]) {
    entries.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
}

fn apply_direction(mut listing: FolderListing, direction: SortDirection) -> FolderListing {
    if direction == SortDirection::Descending {
        listing.folders.reverse();
        listing.files.reverse();
    }
    listing
}

/// Log-and-degrade helper: list a folder, returning an empty listing when
/// the failure is not actionable by the caller.
///
/// Auth expiry is always propagated so the caller can re-authenticate.
pub async fn list_or_empty<A: RemoteApi>(
    lister: &mut RemoteLister<A>,
    path: &str,
    direction: SortDirection,
) -> Result<FolderListing> {
    match lister.list(path, direction).await {
        Ok(listing) => Ok(listing),
        Err(e) if e.is_auth_error() => Err(e),
        Err(e) => {
            warn!("Listing {:?} failed, returning empty listing: {}", path, e);
            Ok(FolderListing::default())
        }
    }
}

//! Track catalog registration.
//!
//! The catalog is the external relational store of library tracks; this
//! module only performs the insert that turns a stored object into a
//! library record. Record construction enforces that the durable storage
//! reference comes from the gateway's descriptor, never from a transient
//! playback URL.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::gateway::StorageDescriptor;

/// Default timeout for catalog requests, in seconds.
pub const DEFAULT_CATALOG_TIMEOUT_SECS: u64 = 30;

/// The row committed to the track catalog.
///
/// Field names follow the catalog service's wire contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackRecord {
    /// Track title.
    pub title: String,
    /// Artist name.
    pub artist: String,
    /// Formatted duration (`M:SS`, or `--:--` when unresolved).
    pub duration: String,
    /// Storage tier holding the object.
    pub storage_type: String,
    /// Private storage key (mutually exclusive with `storage_url`).
    pub storage_key: Option<String>,
    /// Public storage URL (mutually exclusive with `storage_key`).
    pub storage_url: Option<String>,
    /// Legacy remote-path column; always null for gateway-stored tracks.
    pub dropbox_path: Option<String>,
    /// Legacy direct-URL column; always null for gateway-stored tracks.
    #[serde(rename = "fileUrl")]
    pub file_url: Option<String>,
    /// Whether the track is publicly visible.
    pub is_public: bool,
}

impl TrackRecord {
    /// Build a record from a storage descriptor and resolved metadata.
    ///
    /// The durable reference is taken from the descriptor; the playback URL
    /// used for probing never appears here.
    #[must_use]
    pub fn from_descriptor(
        descriptor: &StorageDescriptor,
        title: impl Into<String>,
        artist: impl Into<String>,
        duration: impl Into<String>,
        is_public: bool,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            duration: duration.into(),
            storage_type: descriptor.backend.clone(),
            storage_key: descriptor.storage_key().map(String::from),
            storage_url: descriptor.storage_url().map(String::from),
            dropbox_path: None,
            file_url: None,
            is_public,
        }
    }
}

/// Inserts records into the track catalog.
///
/// The seam between the orchestrator and the catalog service, implemented
/// over HTTP in production and by mocks in tests.
#[cfg_attr(test, mockall::automock)]
pub trait CatalogStore {
    /// Insert a track record, returning the new track id.
    async fn insert_track(&self, record: &TrackRecord) -> Result<String>;
}

/// HTTP implementation of [`CatalogStore`] using a bearer token.
pub struct HttpCatalogClient {
    client: reqwest::Client,
    insert_url: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct InsertResponse {
    id: String,
}

impl HttpCatalogClient {
    /// Create a catalog client for the given insert endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(insert_url: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_CATALOG_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            insert_url: insert_url.into(),
            access_token: access_token.into(),
        })
    }
}

impl CatalogStore for HttpCatalogClient {
    async fn insert_track(&self, record: &TrackRecord) -> Result<String> {
        debug!("Inserting catalog record for {:?}", record.title);

        let response = self
            .client
            .post(&self.insert_url)
            .bearer_auth(&self.access_token)
            .json(record)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    Error::network_error(format!("catalog insert failed: {e}"))
                } else {
                    Error::from(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => Error::AuthExpired("catalog rejected the access token".to_string()),
                500..=599 => {
                    Error::network_error(format!("catalog insert returned {status}: {body}"))
                }
                code => Error::Other(format!("catalog insert returned {code}: {body}")),
            });
        }

        let inserted: InsertResponse = response.json().await?;
        info!("Catalog insert succeeded: id={}", inserted.id);
        Ok(inserted.id)
    }
}

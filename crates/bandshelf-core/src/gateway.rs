//! Transcode/store gateway client.
//!
//! The gateway is the external service that takes a source URL or raw bytes
//! and places the audio in durable object storage, optionally converting the
//! codec first. Two mutually exclusive call shapes exist:
//!
//! - **Pass-through store** for already-compressed input
//! - **Transcode-then-store** for formats that must be converted
//!
//! Both return a short-lived playback URL (used only for duration probing)
//! and a durable storage reference (public URL or private key). Only the
//! durable reference may ever reach the catalog.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AudioQuality;
use crate::error::{Error, Result};

/// Where the bytes for a store request come from.
#[derive(Debug, Clone)]
pub enum StoreSource {
    /// A resolvable URL the gateway fetches itself (remote imports).
    Url(String),
    /// Raw file bytes uploaded with the request (local imports).
    Bytes(Vec<u8>),
}

/// A request to place one audio file in durable storage.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    /// Source of the audio bytes.
    pub source: StoreSource,
    /// Original filename, used for naming and format detection downstream.
    pub file_name: String,
    /// Desired output quality.
    pub quality: AudioQuality,
}

/// Durable reference to a stored object.
///
/// Exactly one of the two shapes exists for any stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StorageRef {
    /// Publicly resolvable URL.
    PublicUrl(String),
    /// Private storage key, resolved to a signed URL at playback time.
    PrivateKey(String),
}

/// The durable result of placing bytes in storage.
///
/// Produced only by the gateway and immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDescriptor {
    /// Durable reference to the object.
    pub reference: StorageRef,
    /// Storage tier holding the object (affects signed-URL issuance later).
    pub backend: String,
}

impl StorageDescriptor {
    /// The private storage key, if this descriptor carries one.
    #[must_use]
    pub fn storage_key(&self) -> Option<&str> {
        match &self.reference {
            StorageRef::PrivateKey(key) => Some(key),
            StorageRef::PublicUrl(_) => None,
        }
    }

    /// The public URL, if this descriptor carries one.
    #[must_use]
    pub fn storage_url(&self) -> Option<&str> {
        match &self.reference {
            StorageRef::PublicUrl(url) => Some(url),
            StorageRef::PrivateKey(_) => None,
        }
    }

    /// Whether the stored object is publicly reachable.
    #[must_use]
    pub const fn is_public(&self) -> bool {
        matches!(self.reference, StorageRef::PublicUrl(_))
    }
}

/// Result of a successful gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Resolvable playback URL for duration probing. Possibly short-lived;
    /// never persisted.
    pub playback_url: String,
    /// Durable storage reference for the catalog.
    pub descriptor: StorageDescriptor,
    /// Whether the gateway converted the codec.
    pub transcoded: bool,
}

/// Client for the transcode/store backend.
///
/// The seam between the orchestrator and the conversion service, implemented
/// over HTTP in production and by mocks in tests.
pub trait StoreGateway {
    /// Store already-compressed input as-is.
    async fn store(&self, request: &StoreRequest) -> Result<StoredObject>;

    /// Convert the input to the requested codec, then store.
    async fn transcode_store(&self, request: &StoreRequest) -> Result<StoredObject>;
}

/// Wire response shared by both gateway endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// Whether the backend reports success.
    pub ok: bool,
    /// Resolvable playback URL.
    pub url: String,
    /// Storage tier holding the object.
    pub storage_type: String,
    /// Private storage key, when the object landed in private storage.
    #[serde(default)]
    pub storage_key: Option<String>,
    /// Public URL, when the object landed in public storage.
    #[serde(default, rename = "publicUrl")]
    pub public_url: Option<String>,
    /// Whether the backend converted the codec.
    #[serde(default)]
    pub transcoded: bool,
    /// Quality the backend applied.
    #[serde(default)]
    pub quality: Option<String>,
    /// Original filename echoed back.
    #[serde(default, rename = "originalFilename")]
    pub original_filename: Option<String>,
}

impl GatewayResponse {
    /// Validate the response and extract the stored object.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the backend reports failure or
    /// returns neither a public URL nor a private storage key.
    pub fn into_stored_object(self) -> Result<StoredObject> {
        if !self.ok {
            return Err(Error::validation("gateway response reported ok=false"));
        }

        let reference = match (self.public_url, self.storage_key) {
            (Some(url), _) if !url.is_empty() => StorageRef::PublicUrl(url),
            (_, Some(key)) if !key.is_empty() => StorageRef::PrivateKey(key),
            _ => {
                return Err(Error::validation(
                    "gateway returned neither a public URL nor a storage key",
                ));
            }
        };

        Ok(StoredObject {
            playback_url: self.url,
            descriptor: StorageDescriptor {
                reference,
                backend: self.storage_type,
            },
            transcoded: self.transcoded,
        })
    }
}

/// HTTP implementation of [`StoreGateway`].
pub struct HttpStoreGateway {
    client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct UrlStoreBody<'a> {
    #[serde(rename = "audioUrl")]
    audio_url: &'a str,
    #[serde(rename = "fileName")]
    file_name: &'a str,
    quality: &'a str,
}

impl HttpStoreGateway {
    /// Pass-through store endpoint path.
    pub const PROCESS_ENDPOINT: &'static str = "api/process-audio";
    /// Transcode-then-store endpoint path.
    pub const TRANSCODE_ENDPOINT: &'static str = "api/transcode-audio";

    /// Create a gateway client for the given base URL and call timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    async fn call(&self, endpoint: &str, request: &StoreRequest) -> Result<StoredObject> {
        let url = format!("{}/{endpoint}", self.base_url);
        debug!(
            "Gateway call: endpoint={}, file={}, quality={}",
            endpoint, request.file_name, request.quality
        );

        let builder = match &request.source {
            StoreSource::Url(audio_url) => self.client.post(&url).json(&UrlStoreBody {
                audio_url,
                file_name: &request.file_name,
                quality: request.quality.as_param(),
            }),
            StoreSource::Bytes(bytes) => {
                let part = reqwest::multipart::Part::bytes(bytes.clone())
                    .file_name(request.file_name.clone());
                let form = reqwest::multipart::Form::new()
                    .part("file", part)
                    .text("fileName", request.file_name.clone())
                    .text("quality", request.quality.as_param().to_string());
                self.client.post(&url).multipart(form)
            }
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(format!("gateway call to {endpoint}"), self.timeout_secs)
            } else {
                e.into()
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::gateway(status.as_u16(), body));
        }

        let parsed: GatewayResponse = response.json().await?;
        let stored = parsed.into_stored_object()?;
        info!(
            "Gateway stored {} (backend={}, transcoded={})",
            request.file_name, stored.descriptor.backend, stored.transcoded
        );
        Ok(stored)
    }
}

impl StoreGateway for HttpStoreGateway {
    async fn store(&self, request: &StoreRequest) -> Result<StoredObject> {
        self.call(Self::PROCESS_ENDPOINT, request).await
    }

    async fn transcode_store(&self, request: &StoreRequest) -> Result<StoredObject> {
        self.call(Self::TRANSCODE_ENDPOINT, request).await
    }
}

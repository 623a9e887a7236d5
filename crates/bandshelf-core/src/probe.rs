//! Playback metadata probing.
//!
//! Given a resolvable URL to an audio resource, determine its playable
//! duration and, opportunistically, the title/artist tags embedded in the
//! file. Both operations degrade instead of failing: duration probing races
//! against a fixed deadline and falls back to a default, and tag extraction
//! returns an empty result on any error.

use std::io::Cursor;
use std::time::Duration;

use id3::{Tag, TagLike};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DEFAULT_PROBE_TIMEOUT_SECS;
use crate::error::{Error, Result};
use crate::format::file_stem;

/// Duration reported when a resource cannot be probed in time, in seconds.
pub const FALLBACK_DURATION_SECS: u64 = 180;

/// How many leading bytes of the resource are fetched for probing.
///
/// Enough for an ID3v2 header and tag frames on real-world files.
pub const PROBE_FETCH_LIMIT: u64 = 256 * 1024;

/// Rendering of an unresolvable duration.
pub const UNKNOWN_DURATION: &str = "--:--";

/// Best-effort tags extracted from an audio resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackTags {
    /// Track title, if tagged.
    pub title: Option<String>,
    /// Artist name, if tagged.
    pub artist: Option<String>,
}

impl TrackTags {
    /// Check whether any tag was extracted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.artist.is_none()
    }

    /// Resolve the title to commit, falling back to the filename stem.
    #[must_use]
    pub fn title_or_stem(&self, filename: &str) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| file_stem(filename).to_string())
    }

    /// Resolve the artist to commit, falling back to a display default.
    #[must_use]
    pub fn artist_or_unknown(&self) -> String {
        self.artist
            .clone()
            .unwrap_or_else(|| "Unknown Artist".to_string())
    }
}

/// Probes duration and tags from a resolvable URL.
///
/// The seam between the orchestrator and the network: implemented over HTTP
/// in production and by mocks in tests.
pub trait MetadataProber {
    /// Determine the playable duration of the resource, in seconds.
    ///
    /// Infallible by contract: on timeout, transport error or an
    /// undecodable payload this returns [`FALLBACK_DURATION_SECS`].
    async fn probe_duration(&self, url: &str) -> u64;

    /// Extract title/artist tags on a best-effort basis.
    ///
    /// Any extraction failure yields an empty [`TrackTags`], never an error.
    async fn probe_tags(&self, url: &str, filename: &str) -> TrackTags;
}

/// HTTP implementation of [`MetadataProber`].
///
/// Fetches the head of the resource with a ranged request and reads embedded
/// tag data; the whole probe runs inside a fixed deadline.
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    /// Create a prober with the default deadline.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS))
    }

    /// Create a prober with a custom deadline.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    /// Fetch the leading bytes of the resource.
    async fn fetch_head(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .header(
                reqwest::header::RANGE,
                format!("bytes=0-{}", PROBE_FETCH_LIMIT - 1),
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Other(format!(
                "probe fetch returned {}",
                status.as_u16()
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

impl MetadataProber for HttpProber {
    async fn probe_duration(&self, url: &str) -> u64 {
        let probe = async {
            let bytes = self.fetch_head(url).await?;
            Ok::<_, Error>(duration_from_bytes(&bytes))
        };

        match tokio::time::timeout(self.timeout, probe).await {
            Ok(Ok(Some(secs))) => secs,
            Ok(Ok(None)) => {
                debug!("No duration in probed data, using fallback");
                FALLBACK_DURATION_SECS
            }
            Ok(Err(e)) => {
                warn!("Duration probe failed, using fallback: {}", e);
                FALLBACK_DURATION_SECS
            }
            Err(_) => {
                warn!(
                    "Duration probe exceeded {}s deadline, using fallback",
                    self.timeout.as_secs()
                );
                FALLBACK_DURATION_SECS
            }
        }
    }

    async fn probe_tags(&self, url: &str, filename: &str) -> TrackTags {
        let probe = async { self.fetch_head(url).await };

        match tokio::time::timeout(self.timeout, probe).await {
            Ok(Ok(bytes)) => tags_from_bytes(&bytes),
            Ok(Err(e)) => {
                debug!("Tag probe for {} failed: {}", filename, e);
                TrackTags::default()
            }
            Err(_) => {
                debug!("Tag probe for {} timed out", filename);
                TrackTags::default()
            }
        }
    }
}

/// Read title/artist tags from raw audio bytes.
///
/// Used both by the HTTP prober and for locally selected files, where no
/// URL exists before the store step. Returns empty tags when no tag data is
/// present or readable.
#[must_use]
pub fn tags_from_bytes(bytes: &[u8]) -> TrackTags {
    match Tag::read_from2(Cursor::new(bytes)) {
        Ok(tag) => TrackTags {
            title: tag.title().map(String::from),
            artist: tag.artist().map(String::from),
        },
        Err(id3::Error {
            kind: id3::ErrorKind::NoTag,
            ..
        }) => TrackTags::default(),
        Err(e) => {
            debug!("Unreadable tag data: {}", e);
            TrackTags::default()
        }
    }
}

/// Read a tagged duration from raw audio bytes, in seconds.
#[must_use]
pub fn duration_from_bytes(bytes: &[u8]) -> Option<u64> {
    Tag::read_from2(Cursor::new(bytes))
        .ok()
        .and_then(|tag| tag.duration())
        .map(u64::from)
}

/// Format a duration as `M:SS` with zero-padded seconds.
///
/// `None` renders as [`UNKNOWN_DURATION`].
#[must_use]
pub fn format_duration(secs: Option<u64>) -> String {
    match secs {
        Some(secs) => {
            let mins = secs / 60;
            let secs = secs % 60;
            format!("{mins}:{secs:02}")
        }
        None => UNKNOWN_DURATION.to_string(),
    }
}

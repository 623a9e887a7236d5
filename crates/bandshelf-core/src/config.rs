//! Import pipeline configuration.
//!
//! Holds the persisted user preferences (output quality, visibility) and the
//! operational knobs (timeouts, commit retry policy). The orchestrator takes
//! an [`ImportConfig`] at construction time; nothing in the pipeline reads
//! ambient storage, which keeps the whole flow testable without a simulated
//! environment.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Default timeout for transcode/store gateway calls, in seconds.
///
/// Generous because the gateway streams and re-encodes whole audio files.
pub const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 60;

/// Default timeout for duration probing, in seconds.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 15;

/// Default number of catalog-commit attempts per job.
pub const DEFAULT_COMMIT_ATTEMPTS: u32 = 3;

/// Default base backoff between commit attempts, in milliseconds (doubles
/// after each failure).
pub const DEFAULT_COMMIT_BACKOFF_MS: u64 = 500;

/// Output quality for stored audio.
///
/// Maps directly to the gateway's `quality` parameter; the variant also
/// determines the target codec when a file is routed through transcoding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum AudioQuality {
    /// MP3 at 320 kbps (default).
    #[default]
    #[serde(rename = "mp3-320")]
    Mp3At320,
    /// AAC at 320 kbps (opt-in).
    #[serde(rename = "aac-320")]
    AacAt320,
}

impl AudioQuality {
    /// Wire value sent as the gateway `quality` parameter.
    #[must_use]
    pub const fn as_param(self) -> &'static str {
        match self {
            Self::Mp3At320 => "mp3-320",
            Self::AacAt320 => "aac-320",
        }
    }

    /// Target codec name for the transcode path.
    #[must_use]
    pub const fn target_codec(self) -> &'static str {
        match self {
            Self::Mp3At320 => "mp3",
            Self::AacAt320 => "aac",
        }
    }
}

impl std::fmt::Display for AudioQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_param())
    }
}

/// Configuration for the import pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportConfig {
    /// Output quality preference.
    #[serde(default)]
    pub quality: AudioQuality,
    /// Whether committed tracks are publicly visible.
    #[serde(default)]
    pub make_public: bool,
    /// Timeout for a single gateway call, in seconds.
    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_secs: u64,
    /// Timeout for duration probing, in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Maximum catalog-commit attempts per job.
    #[serde(default = "default_commit_attempts")]
    pub commit_attempts: u32,
    /// Base backoff between commit attempts, in milliseconds.
    #[serde(default = "default_commit_backoff")]
    pub commit_backoff_ms: u64,
}

const fn default_gateway_timeout() -> u64 {
    DEFAULT_GATEWAY_TIMEOUT_SECS
}

const fn default_probe_timeout() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

const fn default_commit_attempts() -> u32 {
    DEFAULT_COMMIT_ATTEMPTS
}

const fn default_commit_backoff() -> u64 {
    DEFAULT_COMMIT_BACKOFF_MS
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            quality: AudioQuality::default(),
            make_public: false,
            gateway_timeout_secs: DEFAULT_GATEWAY_TIMEOUT_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            commit_attempts: DEFAULT_COMMIT_ATTEMPTS,
            commit_backoff_ms: DEFAULT_COMMIT_BACKOFF_MS,
        }
    }
}

impl ImportConfig {
    /// Gateway timeout as a [`Duration`].
    #[must_use]
    pub const fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    /// Probe timeout as a [`Duration`].
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Load configuration from disk, or return defaults if no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        if !config_path.exists() {
            debug!("Import config not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            Error::Other(format!(
                "failed to parse config file {}: {e}",
                config_path.display()
            ))
        })?;

        info!("Loaded import config from {}", config_path.display());
        Ok(config)
    }

    /// Save configuration to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save(&self) -> Result<()> {
        let config_path = config_file_path();

        if let Some(parent) = config_path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, content)?;

        info!("Saved import config to {}", config_path.display());
        Ok(())
    }

    /// Update the quality preference and persist it.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn set_quality(&mut self, quality: AudioQuality) -> Result<()> {
        self.quality = quality;
        if let Err(e) = self.save() {
            warn!("Failed to persist quality preference: {}", e);
            return Err(e);
        }
        Ok(())
    }
}

/// Get the path to the config file.
fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("bandshelf")
        .join("import.json")
}

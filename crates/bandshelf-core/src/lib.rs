//! Bandshelf Core Library
//!
//! This crate provides the audio import pipeline for the Bandshelf
//! application:
//! - Remote-storage browsing with audio filtering and session caching
//! - Format classification (pass-through vs. transcode)
//! - Playback metadata probing (duration, best-effort tags)
//! - Transcode/store gateway placement into durable object storage
//! - Atomic catalog registration with commit retry
//! - The batch import orchestrator tying the steps together, with
//!   per-file progress snapshots and retry
//!
//! # Error Handling
//!
//! Every fallible operation returns the crate-level [`Error`], whose
//! [`ErrorKind`] classification drives retry and re-authentication
//! decisions. See the [`error`] module for details.

#![allow(async_fn_in_trait)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod format;
pub mod gateway;
pub mod import;
pub mod local;
pub mod probe;
pub mod remote;
pub mod selection;

pub use catalog::{CatalogStore, HttpCatalogClient, TrackRecord};
pub use config::{
    AudioQuality, DEFAULT_COMMIT_ATTEMPTS, DEFAULT_COMMIT_BACKOFF_MS,
    DEFAULT_GATEWAY_TIMEOUT_SECS, DEFAULT_PROBE_TIMEOUT_SECS, ImportConfig,
};
pub use error::{Error, ErrorKind, Result};
pub use format::{
    MUST_TRANSCODE_EXTENSIONS, SUPPORTED_AUDIO_EXTENSIONS, audio_extension, display_name,
    file_stem, is_audio_file, needs_transcode,
};
pub use gateway::{
    HttpStoreGateway, StorageDescriptor, StorageRef, StoreGateway, StoreRequest, StoreSource,
    StoredObject,
};
pub use import::{
    BatchStats, BatchSummary, ImportCandidate, ImportEvent, ImportJob, ImportOrchestrator,
    JobError, JobId, JobStatus, PROGRESS_COMMITTING, PROGRESS_DONE, PROGRESS_GATEWAY,
    PROGRESS_STARTED, PROGRESS_STORED, SourceRef,
};
pub use local::discover_local_candidates;
pub use probe::{
    FALLBACK_DURATION_SECS, HttpProber, MetadataProber, PROBE_FETCH_LIMIT, TrackTags,
    UNKNOWN_DURATION, duration_from_bytes, format_duration, tags_from_bytes,
};
pub use remote::{
    FolderListing, HttpRemoteApi, ListPage, RawEntry, RemoteApi, RemoteEntry, RemoteLister,
    SortDirection, list_or_empty,
};
pub use selection::{SelectAllState, SelectionTracker, summary_line};

//! Import orchestrator for moving audio files into the library.
//!
//! Drives each selected file through classification, metadata probing, the
//! transcode/store gateway and the catalog commit, tracking a per-file
//! status and progress percentage. Batches are processed strictly
//! sequentially so at most one gateway call is in flight; a failed file
//! never halts the batch, and failed jobs remain individually retryable.
//!
//! State changes are published as immutable job snapshots over an event
//! channel; the UI adapter consumes snapshots and never mutates pipeline
//! state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogStore, TrackRecord};
use crate::config::ImportConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::format::{display_name, needs_transcode};
use crate::gateway::{StoreGateway, StoreRequest, StoreSource};
use crate::probe::{MetadataProber, TrackTags, format_duration, tags_from_bytes};
use crate::remote::RemoteApi;

/// Unique identifier for an import job.
pub type JobId = u64;

/// Progress checkpoint: job started, probing source metadata.
pub const PROGRESS_STARTED: u8 = 10;
/// Progress checkpoint: entering the gateway call.
pub const PROGRESS_GATEWAY: u8 = 35;
/// Progress checkpoint: gateway returned, probing the stored object.
pub const PROGRESS_STORED: u8 = 65;
/// Progress checkpoint: entering the catalog commit.
pub const PROGRESS_COMMITTING: u8 = 85;
/// Progress checkpoint: import complete.
pub const PROGRESS_DONE: u8 = 100;

/// Opaque locator for the bytes of an import candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceRef {
    /// A file in the linked remote-storage account.
    Remote {
        /// Full remote path.
        path: String,
    },
    /// A locally selected file.
    Local {
        /// Path on the local filesystem.
        path: PathBuf,
    },
}

impl SourceRef {
    /// Stable key used to detect duplicate in-flight imports of one source.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Remote { path } => format!("remote:{path}"),
            Self::Local { path } => format!("local:{}", path.display()),
        }
    }
}

/// One file awaiting import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCandidate {
    /// Locator for the file's bytes. Immutable once created.
    pub source: SourceRef,
    /// Name shown to the user, derived from the source.
    pub display_name: String,
    /// Size in bytes; informational only.
    pub size_bytes: u64,
}

impl ImportCandidate {
    /// Create a candidate for a remote file.
    #[must_use]
    pub fn remote(path: impl Into<String>, size_bytes: u64) -> Self {
        let path = path.into();
        let display = display_name(&path);
        Self {
            source: SourceRef::Remote { path },
            display_name: display,
            size_bytes,
        }
    }

    /// Create a candidate for a local file.
    #[must_use]
    pub fn local(path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        let path = path.into();
        let display = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self {
            source: SourceRef::Local { path },
            display_name: display,
            size_bytes,
        }
    }
}

/// Status of an import job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to start.
    Pending,
    /// Reading metadata from the source or the stored object.
    Probing,
    /// Gateway call in flight on the transcode path.
    Converting,
    /// Gateway call in flight on the pass-through path.
    Uploading,
    /// Catalog insert in flight.
    Committing,
    /// Import complete; the track is in the catalog.
    Succeeded,
    /// Import failed; see the job's error.
    Failed,
}

impl JobStatus {
    /// Check whether this status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Probing => write!(f, "Probing"),
            Self::Converting => write!(f, "Converting"),
            Self::Uploading => write!(f, "Uploading"),
            Self::Committing => write!(f, "Committing"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Failure details attached to a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    /// Human-readable cause.
    pub message: String,
    /// Machine-checkable failure class.
    pub kind: ErrorKind,
}

/// The unit the orchestrator owns for one candidate during one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    /// Unique job identifier.
    pub id: JobId,
    /// The candidate being imported (shared, read-only).
    pub candidate: Arc<ImportCandidate>,
    /// Current status.
    pub status: JobStatus,
    /// Progress percentage, non-decreasing within an attempt.
    pub progress_percent: u8,
    /// Failure details; present only when `status` is `Failed`.
    pub error: Option<JobError>,
    /// Catalog track id; set only on `Succeeded`.
    pub result_track_id: Option<String>,
    /// Attempt counter; starts at 1 and increments on retry.
    pub attempt: u32,
}

impl ImportJob {
    fn new(id: JobId, candidate: Arc<ImportCandidate>) -> Self {
        Self {
            id,
            candidate,
            status: JobStatus::Pending,
            progress_percent: 0,
            error: None,
            result_track_id: None,
            attempt: 1,
        }
    }

    /// Check whether the job is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check whether the retry affordance applies to this job.
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        matches!(self.status, JobStatus::Failed)
    }
}

/// Aggregate outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Number of jobs that reached `Succeeded`.
    pub completed: usize,
    /// Number of jobs that reached `Failed`.
    pub failed: usize,
    /// Number of jobs in the batch.
    pub total: usize,
    /// Ids of the failed jobs, for user-driven retry.
    pub failed_jobs: Vec<JobId>,
}

/// Running counts over the job table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Jobs waiting to start.
    pub pending: usize,
    /// Jobs between start and a terminal state.
    pub in_progress: usize,
    /// Jobs that succeeded.
    pub succeeded: usize,
    /// Jobs that failed.
    pub failed: usize,
}

/// Event types published by the orchestrator.
///
/// Every payload is an immutable snapshot; events are emitted synchronously
/// after each state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ImportEvent {
    /// A job was added to the table.
    JobQueued(ImportJob),
    /// A job changed status or progress.
    JobUpdated(ImportJob),
    /// A file finished; running batch tally.
    BatchProgress {
        /// Jobs succeeded so far in this batch.
        completed: usize,
        /// Jobs failed so far in this batch.
        failed: usize,
        /// Total jobs in this batch.
        total: usize,
    },
    /// The batch finished.
    BatchFinished(BatchSummary),
    /// The remote authorization expired. Emitted at most once per batch so
    /// the caller can raise a single re-authentication prompt.
    AuthExpired,
}

/// Internal job table, owned exclusively by the orchestrator.
struct JobTable {
    jobs: Vec<ImportJob>,
    next_id: JobId,
    auth_notified: bool,
}

impl JobTable {
    const fn new() -> Self {
        Self {
            jobs: Vec::new(),
            next_id: 0,
            auth_notified: false,
        }
    }

    const fn next_job_id(&mut self) -> JobId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn find(&self, id: JobId) -> Option<&ImportJob> {
        self.jobs.iter().find(|job| job.id == id)
    }

    fn find_mut(&mut self, id: JobId) -> Option<&mut ImportJob> {
        self.jobs.iter_mut().find(|job| job.id == id)
    }

    /// Check whether a non-terminal job already exists for a source.
    fn has_active_for(&self, source_key: &str, exclude: Option<JobId>) -> bool {
        self.jobs.iter().any(|job| {
            !job.is_terminal()
                && exclude != Some(job.id)
                && job.candidate.source.key() == source_key
        })
    }

    fn stats(&self) -> BatchStats {
        let mut stats = BatchStats::default();
        for job in &self.jobs {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Succeeded => stats.succeeded += 1,
                JobStatus::Failed => stats.failed += 1,
                _ => stats.in_progress += 1,
            }
        }
        stats
    }
}

/// Drives import jobs through the pipeline.
///
/// All collaborators and configuration are injected at construction; the
/// orchestrator reads nothing from ambient storage. The public entry point
/// is async and suspends at every network boundary, so a UI caller stays
/// responsive by spawning it and consuming events.
pub struct ImportOrchestrator<A, G, P, C> {
    remote: A,
    gateway: G,
    prober: P,
    catalog: C,
    config: ImportConfig,
    table: Arc<RwLock<JobTable>>,
    event_tx: mpsc::UnboundedSender<ImportEvent>,
    event_rx: Arc<RwLock<mpsc::UnboundedReceiver<ImportEvent>>>,
}

impl<A, G, P, C> ImportOrchestrator<A, G, P, C>
where
    A: RemoteApi,
    G: StoreGateway,
    P: MetadataProber,
    C: CatalogStore,
{
    /// Create an orchestrator over the given collaborators.
    pub fn new(remote: A, gateway: G, prober: P, catalog: C, config: ImportConfig) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            remote,
            gateway,
            prober,
            catalog,
            config,
            table: Arc::new(RwLock::new(JobTable::new())),
            event_tx,
            event_rx: Arc::new(RwLock::new(event_rx)),
        }
    }

    /// Import the selected candidates, strictly sequentially in selection
    /// order.
    ///
    /// A failed file does not halt the batch. Candidates with an import
    /// already in flight are skipped. The returned summary never errors;
    /// per-file failures are reported through job snapshots and the
    /// `failed_jobs` list.
    pub async fn import_selected(&self, candidates: Vec<ImportCandidate>) -> BatchSummary {
        let mut job_ids = Vec::with_capacity(candidates.len());

        {
            let mut table = self.table.write().await;
            // A fresh batch may notify about auth expiry again.
            table.auth_notified = false;

            for candidate in candidates {
                let key = candidate.source.key();
                if table.has_active_for(&key, None) {
                    warn!(
                        "Skipping {}: an import for this source is already in flight",
                        candidate.display_name
                    );
                    continue;
                }

                let id = table.next_job_id();
                let job = ImportJob::new(id, Arc::new(candidate));
                info!("Queued import job {}: {}", id, job.candidate.display_name);
                let _ = self.event_tx.send(ImportEvent::JobQueued(job.clone()));
                table.jobs.push(job);
                job_ids.push(id);
            }
        }

        let mut summary = BatchSummary {
            total: job_ids.len(),
            ..Default::default()
        };

        for id in job_ids {
            if self.run_job(id).await {
                summary.completed += 1;
            } else {
                summary.failed += 1;
                summary.failed_jobs.push(id);
            }

            let _ = self.event_tx.send(ImportEvent::BatchProgress {
                completed: summary.completed,
                failed: summary.failed,
                total: summary.total,
            });
        }

        info!(
            "Batch finished: {}/{} succeeded, {} failed",
            summary.completed, summary.total, summary.failed
        );
        let _ = self
            .event_tx
            .send(ImportEvent::BatchFinished(summary.clone()));

        summary
    }

    /// Re-run a failed job from `Pending` as a fresh attempt.
    ///
    /// Only failed jobs can be retried; the job keeps its id and candidate
    /// but starts over with cleared progress and error.
    ///
    /// # Errors
    ///
    /// Returns an error if the job does not exist, is not failed, or
    /// another import for the same source is already in flight.
    pub async fn retry(&self, job_id: JobId) -> Result<()> {
        {
            let mut table = self.table.write().await;
            table.auth_notified = false;

            let Some(job) = table.find(job_id) else {
                return Err(Error::Other(format!("no import job with id {job_id}")));
            };
            if !job.can_retry() {
                return Err(Error::validation("only failed jobs can be retried"));
            }
            let key = job.candidate.source.key();
            if table.has_active_for(&key, Some(job_id)) {
                return Err(Error::validation(
                    "an import for this source is already in flight",
                ));
            }

            if let Some(job) = table.find_mut(job_id) {
                job.status = JobStatus::Pending;
                job.progress_percent = 0;
                job.error = None;
                job.result_track_id = None;
                job.attempt += 1;
                info!(
                    "Retrying import job {} (attempt {}): {}",
                    job_id, job.attempt, job.candidate.display_name
                );
                let _ = self.event_tx.send(ImportEvent::JobUpdated(job.clone()));
            }
        }

        self.run_job(job_id).await;
        Ok(())
    }

    /// Snapshot of all jobs in the table.
    pub async fn jobs(&self) -> Vec<ImportJob> {
        let table = self.table.read().await;
        table.jobs.clone()
    }

    /// Snapshot of a single job.
    pub async fn job(&self, id: JobId) -> Option<ImportJob> {
        let table = self.table.read().await;
        table.find(id).cloned()
    }

    /// Running counts over the job table.
    pub async fn stats(&self) -> BatchStats {
        let table = self.table.read().await;
        table.stats()
    }

    /// Remove all terminal jobs, as when the batch UI is cleared.
    ///
    /// Returns the number of jobs removed.
    pub async fn clear_finished(&self) -> usize {
        let mut table = self.table.write().await;
        let before = table.jobs.len();
        table.jobs.retain(|job| !job.is_terminal());
        let removed = before - table.jobs.len();
        if removed > 0 {
            debug!("Cleared {} finished import jobs", removed);
        }
        removed
    }

    /// Try to receive an event without blocking.
    pub async fn try_recv_event(&self) -> Option<ImportEvent> {
        let mut rx = self.event_rx.write().await;
        rx.try_recv().ok()
    }

    /// Get a clone of the event sender for external use.
    #[must_use]
    pub fn event_sender(&self) -> mpsc::UnboundedSender<ImportEvent> {
        self.event_tx.clone()
    }

    /// Drive one job through the pipeline. Returns whether it succeeded.
    async fn run_job(&self, id: JobId) -> bool {
        let Some(candidate) = self.job(id).await.map(|job| job.candidate) else {
            error!("Import job {} disappeared before it could run", id);
            return false;
        };

        info!("Importing {}", candidate.display_name);
        self.transition(id, JobStatus::Probing, PROGRESS_STARTED)
            .await;

        let (source, tags) = match self.resolve_source(&candidate).await {
            Ok(resolved) => resolved,
            Err(e) => {
                self.fail_job(id, &e).await;
                return false;
            }
        };

        let transcode = needs_transcode(&candidate.display_name);
        let gateway_status = if transcode {
            JobStatus::Converting
        } else {
            JobStatus::Uploading
        };
        self.transition(id, gateway_status, PROGRESS_GATEWAY).await;

        let request = StoreRequest {
            source,
            file_name: candidate.display_name.clone(),
            quality: self.config.quality,
        };
        let stored = if transcode {
            self.gateway.transcode_store(&request).await
        } else {
            self.gateway.store(&request).await
        };
        let stored = match stored {
            Ok(stored) => stored,
            Err(e) => {
                self.fail_job(id, &e).await;
                return false;
            }
        };

        // Duration is read off the stored object's playback URL; the probe
        // degrades to a fallback value instead of failing the job.
        self.transition(id, JobStatus::Probing, PROGRESS_STORED)
            .await;
        let duration_secs = self.prober.probe_duration(&stored.playback_url).await;

        self.transition(id, JobStatus::Committing, PROGRESS_COMMITTING)
            .await;
        let record = TrackRecord::from_descriptor(
            &stored.descriptor,
            tags.title_or_stem(&candidate.display_name),
            tags.artist_or_unknown(),
            format_duration(Some(duration_secs)),
            self.config.make_public,
        );

        match self.commit_with_retry(&record).await {
            Ok(track_id) => {
                self.mark_succeeded(id, track_id).await;
                true
            }
            Err(e) => {
                self.fail_job(id, &e).await;
                false
            }
        }
    }

    /// Resolve the candidate's bytes and probe its tags best-effort.
    async fn resolve_source(
        &self,
        candidate: &ImportCandidate,
    ) -> Result<(StoreSource, TrackTags)> {
        match &candidate.source {
            SourceRef::Remote { path } => {
                let link = self.remote.temporary_link(path).await?;
                let tags = self.prober.probe_tags(&link, &candidate.display_name).await;
                Ok((StoreSource::Url(link), tags))
            }
            SourceRef::Local { path } => {
                let bytes = tokio::fs::read(path).await?;
                let tags = tags_from_bytes(&bytes);
                Ok((StoreSource::Bytes(bytes), tags))
            }
        }
    }

    /// Insert the record, retrying transient failures with exponential
    /// backoff. Non-transient errors fail immediately.
    async fn commit_with_retry(&self, record: &TrackRecord) -> Result<String> {
        let mut backoff = Duration::from_millis(self.config.commit_backoff_ms);
        let mut attempt = 1;

        loop {
            match self.catalog.insert_track(record).await {
                Ok(track_id) => return Ok(track_id),
                Err(e) if e.is_retryable() && attempt < self.config.commit_attempts => {
                    warn!(
                        "Catalog commit attempt {}/{} failed, retrying in {:?}: {}",
                        attempt, self.config.commit_attempts, backoff, e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Apply a forward transition and publish the snapshot.
    async fn transition(&self, id: JobId, status: JobStatus, progress: u8) {
        let mut table = self.table.write().await;
        if let Some(job) = table.find_mut(id) {
            job.status = status;
            // Progress never moves backwards within an attempt.
            job.progress_percent = job.progress_percent.max(progress);
            debug!(
                "Job {} -> {} ({}%)",
                id, job.status, job.progress_percent
            );
            let _ = self.event_tx.send(ImportEvent::JobUpdated(job.clone()));
        }
    }

    async fn mark_succeeded(&self, id: JobId, track_id: String) {
        let mut table = self.table.write().await;
        if let Some(job) = table.find_mut(id) {
            job.status = JobStatus::Succeeded;
            job.progress_percent = PROGRESS_DONE;
            job.result_track_id = Some(track_id);
            info!("Import job {} succeeded: {}", id, job.candidate.display_name);
            let _ = self.event_tx.send(ImportEvent::JobUpdated(job.clone()));
        }
    }

    async fn fail_job(&self, id: JobId, cause: &Error) {
        let mut table = self.table.write().await;
        if let Some(job) = table.find_mut(id) {
            job.status = JobStatus::Failed;
            job.error = Some(JobError {
                message: cause.to_string(),
                kind: cause.kind(),
            });
            error!(
                "Import job {} failed ({}): {}",
                id,
                cause.kind(),
                cause
            );
            let _ = self.event_tx.send(ImportEvent::JobUpdated(job.clone()));
        }

        // Auth expiry raises a single global notification per batch instead
        // of one per file.
        if cause.is_auth_error() && !table.auth_notified {
            table.auth_notified = true;
            let _ = self.event_tx.send(ImportEvent::AuthExpired);
        }
    }
}

impl<A, G, P, C> std::fmt::Debug for ImportOrchestrator<A, G, P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportOrchestrator").finish_non_exhaustive()
    }
}

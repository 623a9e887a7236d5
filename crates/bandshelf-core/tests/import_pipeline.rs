//! End-to-end batch import tests against mocked collaborators.
//!
//! Covers the full pipeline: classification routing, duration probing and
//! formatting, durable-reference handling, batch isolation, commit retry
//! and user-driven retry of failed jobs.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bandshelf_core::{
    CatalogStore, Error, ErrorKind, FALLBACK_DURATION_SECS, ImportCandidate, ImportConfig,
    ImportEvent, ImportOrchestrator, JobStatus, ListPage, MetadataProber, RemoteApi, Result,
    StorageDescriptor, StorageRef, StoreGateway, StoreRequest, StoreSource, StoredObject,
    TrackRecord, TrackTags,
};

// =============================================================================
// Mock collaborators
// =============================================================================

/// Mock remote API; resolves temporary links deterministically.
#[derive(Clone, Default)]
struct MockRemote {
    expired: bool,
}

impl MockRemote {
    fn expired() -> Self {
        Self { expired: true }
    }
}

impl RemoteApi for MockRemote {
    async fn list_folder(&self, _path: &str) -> Result<ListPage> {
        Ok(ListPage {
            entries: Vec::new(),
            cursor: None,
            has_more: false,
        })
    }

    async fn list_folder_continue(&self, _cursor: &str) -> Result<ListPage> {
        Ok(ListPage {
            entries: Vec::new(),
            cursor: None,
            has_more: false,
        })
    }

    async fn temporary_link(&self, path: &str) -> Result<String> {
        if self.expired {
            return Err(Error::AuthExpired("access token expired".to_string()));
        }
        Ok(format!("https://content.example.com/tmp{path}?sig=short"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct GatewayCall {
    endpoint: &'static str,
    file_name: String,
    was_bytes: bool,
}

/// Mock gateway recording calls; can fail a file a fixed number of times.
#[derive(Clone, Default)]
struct MockGateway {
    fail_remaining: Arc<Mutex<HashMap<String, usize>>>,
    calls: Arc<Mutex<Vec<GatewayCall>>>,
}

impl MockGateway {
    fn failing(file_name: &str, times: usize) -> Self {
        let gateway = Self::default();
        gateway
            .fail_remaining
            .lock()
            .unwrap()
            .insert(file_name.to_string(), times);
        gateway
    }

    fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    fn respond(&self, endpoint: &'static str, request: &StoreRequest) -> Result<StoredObject> {
        self.calls.lock().unwrap().push(GatewayCall {
            endpoint,
            file_name: request.file_name.clone(),
            was_bytes: matches!(request.source, StoreSource::Bytes(_)),
        });

        if let Some(remaining) = self
            .fail_remaining
            .lock()
            .unwrap()
            .get_mut(&request.file_name)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(Error::gateway(500, "conversion backend unavailable"));
        }

        Ok(StoredObject {
            playback_url: format!(
                "https://cdn.example.com/play/{}?sig=temp",
                request.file_name
            ),
            descriptor: StorageDescriptor {
                reference: StorageRef::PrivateKey(format!("audio/{}", request.file_name)),
                backend: "r2".to_string(),
            },
            transcoded: endpoint == "transcode",
        })
    }
}

impl StoreGateway for MockGateway {
    async fn store(&self, request: &StoreRequest) -> Result<StoredObject> {
        self.respond("store", request)
    }

    async fn transcode_store(&self, request: &StoreRequest) -> Result<StoredObject> {
        self.respond("transcode", request)
    }
}

/// Mock prober serving durations keyed by URL substring.
#[derive(Clone, Default)]
struct MockProber {
    durations: Arc<Mutex<HashMap<String, u64>>>,
}

impl MockProber {
    fn with_duration(self, url_fragment: &str, secs: u64) -> Self {
        self.durations
            .lock()
            .unwrap()
            .insert(url_fragment.to_string(), secs);
        self
    }
}

impl MetadataProber for MockProber {
    async fn probe_duration(&self, url: &str) -> u64 {
        self.durations
            .lock()
            .unwrap()
            .iter()
            .find(|(fragment, _)| url.contains(fragment.as_str()))
            .map_or(FALLBACK_DURATION_SECS, |(_, secs)| *secs)
    }

    async fn probe_tags(&self, _url: &str, _filename: &str) -> TrackTags {
        TrackTags::default()
    }
}

/// Mock catalog with configurable transient/hard failures.
#[derive(Clone, Default)]
struct MockCatalog {
    attempts: Arc<AtomicUsize>,
    transient_failures: usize,
    hard_failure: bool,
    records: Arc<Mutex<Vec<TrackRecord>>>,
}

impl MockCatalog {
    fn flaky(transient_failures: usize) -> Self {
        Self {
            transient_failures,
            ..Default::default()
        }
    }

    fn broken() -> Self {
        Self {
            hard_failure: true,
            ..Default::default()
        }
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn records(&self) -> Vec<TrackRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl CatalogStore for MockCatalog {
    async fn insert_track(&self, record: &TrackRecord) -> Result<String> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.hard_failure {
            return Err(Error::Other("catalog schema mismatch".to_string()));
        }
        if attempt < self.transient_failures {
            return Err(Error::network_error("catalog insert timed out"));
        }

        let mut records = self.records.lock().unwrap();
        records.push(record.clone());
        Ok(format!("track-{}", records.len()))
    }
}

type TestOrchestrator = ImportOrchestrator<MockRemote, MockGateway, MockProber, MockCatalog>;

/// Initialize tracing for test output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn orchestrator(gateway: &MockGateway, prober: &MockProber, catalog: &MockCatalog) -> TestOrchestrator {
    ImportOrchestrator::new(
        MockRemote::default(),
        gateway.clone(),
        prober.clone(),
        catalog.clone(),
        ImportConfig::default(),
    )
}

async fn drain_events(orchestrator: &TestOrchestrator) -> Vec<ImportEvent> {
    let mut events = Vec::new();
    while let Some(event) = orchestrator.try_recv_event().await {
        events.push(event);
    }
    events
}

// =============================================================================
// Batch behavior
// =============================================================================

#[tokio::test]
async fn test_two_file_batch_routes_and_formats() {
    init_tracing();

    let gateway = MockGateway::default();
    let prober = MockProber::default()
        .with_duration("song.wav", 125)
        .with_duration("track.mp3", 200);
    let catalog = MockCatalog::default();
    let orchestrator = orchestrator(&gateway, &prober, &catalog);

    let summary = orchestrator
        .import_selected(vec![
            ImportCandidate::remote("/music/song.wav", 9000),
            ImportCandidate::remote("/music/track.mp3", 5000),
        ])
        .await;

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.total, 2);
    assert!(summary.failed_jobs.is_empty());

    // The classifier routed each file to a different gateway shape.
    let calls = gateway.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].endpoint, "transcode");
    assert_eq!(calls[0].file_name, "song.wav");
    assert_eq!(calls[1].endpoint, "store");
    assert_eq!(calls[1].file_name, "track.mp3");

    let records = catalog.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].duration, "2:05");
    assert_eq!(records[1].duration, "3:20");
    assert_eq!(records[0].title, "song");
    assert_eq!(records[0].artist, "Unknown Artist");
}

#[tokio::test]
async fn test_batch_isolation_on_gateway_failure() {
    let gateway = MockGateway::failing("bad.mp3", 1);
    let prober = MockProber::default();
    let catalog = MockCatalog::default();
    let orchestrator = orchestrator(&gateway, &prober, &catalog);

    let summary = orchestrator
        .import_selected(vec![
            ImportCandidate::remote("/music/first.mp3", 1),
            ImportCandidate::remote("/music/bad.mp3", 1),
            ImportCandidate::remote("/music/third.mp3", 1),
        ])
        .await;

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.total, 3);
    assert_eq!(summary.failed_jobs.len(), 1);

    let jobs = orchestrator.jobs().await;
    let failed: Vec<_> = jobs
        .iter()
        .filter(|job| job.status == JobStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].candidate.display_name, "bad.mp3");
    let job_error = failed[0].error.as_ref().expect("failed job carries error");
    assert_eq!(job_error.kind, ErrorKind::Gateway);

    for job in jobs.iter().filter(|job| job.status != JobStatus::Failed) {
        assert_eq!(job.status, JobStatus::Succeeded);
        assert!(job.result_track_id.is_some());
    }
}

#[tokio::test]
async fn test_progress_monotone_and_terminal_values() {
    let gateway = MockGateway::failing("bad.mp3", 1);
    let prober = MockProber::default();
    let catalog = MockCatalog::default();
    let orchestrator = orchestrator(&gateway, &prober, &catalog);

    let summary = orchestrator
        .import_selected(vec![
            ImportCandidate::remote("/music/good.mp3", 1),
            ImportCandidate::remote("/music/bad.mp3", 1),
        ])
        .await;
    assert_eq!(summary.completed, 1);

    let events = drain_events(&orchestrator).await;
    let mut progress_by_job: HashMap<u64, Vec<u8>> = HashMap::new();
    let mut status_by_job: HashMap<u64, JobStatus> = HashMap::new();
    for event in &events {
        if let ImportEvent::JobQueued(job) | ImportEvent::JobUpdated(job) = event {
            progress_by_job
                .entry(job.id)
                .or_default()
                .push(job.progress_percent);
            status_by_job.insert(job.id, job.status);
        }
    }

    assert_eq!(progress_by_job.len(), 2);
    for (job_id, sequence) in &progress_by_job {
        assert!(
            sequence.windows(2).all(|pair| pair[0] <= pair[1]),
            "progress went backwards for job {job_id}: {sequence:?}"
        );
        let last = *sequence.last().expect("at least one snapshot");
        match status_by_job[job_id] {
            JobStatus::Succeeded => assert_eq!(last, 100),
            JobStatus::Failed => assert!(last < 100),
            other => panic!("job {job_id} ended in non-terminal status {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_committed_reference_is_never_the_playback_url() {
    let gateway = MockGateway::default();
    let prober = MockProber::default();
    let catalog = MockCatalog::default();
    let orchestrator = orchestrator(&gateway, &prober, &catalog);

    orchestrator
        .import_selected(vec![ImportCandidate::remote("/music/song.mp3", 1)])
        .await;

    let records = catalog.records();
    assert_eq!(records.len(), 1);
    let key = records[0].storage_key.as_deref().expect("private key set");
    assert_eq!(key, "audio/song.mp3");
    assert!(records[0].storage_url.is_none());
    // The short-lived playback URL never reaches the catalog.
    assert!(!key.contains("sig="));
    assert!(!key.starts_with("https://cdn.example.com"));
    assert!(records[0].file_url.is_none());
    assert!(records[0].dropbox_path.is_none());
}

#[tokio::test]
async fn test_unprobed_duration_falls_back_to_three_minutes() {
    let gateway = MockGateway::default();
    // No duration registered: the prober reports the fallback.
    let prober = MockProber::default();
    let catalog = MockCatalog::default();
    let orchestrator = orchestrator(&gateway, &prober, &catalog);

    orchestrator
        .import_selected(vec![ImportCandidate::remote("/music/mystery.mp3", 1)])
        .await;

    let records = catalog.records();
    assert_eq!(records[0].duration, "3:00");
}

#[tokio::test]
async fn test_batch_events_include_tally_and_finish() {
    let gateway = MockGateway::failing("bad.mp3", 1);
    let prober = MockProber::default();
    let catalog = MockCatalog::default();
    let orchestrator = orchestrator(&gateway, &prober, &catalog);

    orchestrator
        .import_selected(vec![
            ImportCandidate::remote("/music/good.mp3", 1),
            ImportCandidate::remote("/music/bad.mp3", 1),
        ])
        .await;

    let events = drain_events(&orchestrator).await;
    let tallies: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            ImportEvent::BatchProgress {
                completed,
                failed,
                total,
            } => Some((*completed, *failed, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(tallies, vec![(1, 0, 2), (1, 1, 2)]);

    let finished: Vec<_> = events
        .iter()
        .filter(|event| matches!(event, ImportEvent::BatchFinished(_)))
        .collect();
    assert_eq!(finished.len(), 1);
}

#[tokio::test]
async fn test_duplicate_in_flight_candidate_is_skipped() {
    let gateway = MockGateway::default();
    let prober = MockProber::default();
    let catalog = MockCatalog::default();
    let orchestrator = orchestrator(&gateway, &prober, &catalog);

    let summary = orchestrator
        .import_selected(vec![
            ImportCandidate::remote("/music/song.mp3", 1),
            ImportCandidate::remote("/music/song.mp3", 1),
        ])
        .await;

    assert_eq!(summary.total, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(orchestrator.jobs().await.len(), 1);
}

// =============================================================================
// Commit retry policy
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_commit_succeeds_after_two_transient_failures() {
    let gateway = MockGateway::default();
    let prober = MockProber::default();
    let catalog = MockCatalog::flaky(2);
    let orchestrator = orchestrator(&gateway, &prober, &catalog);

    let summary = orchestrator
        .import_selected(vec![ImportCandidate::remote("/music/song.mp3", 1)])
        .await;

    assert_eq!(summary.completed, 1);
    assert_eq!(catalog.attempts(), 3);

    let jobs = orchestrator.jobs().await;
    let job = &jobs[0];
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.progress_percent, 100);
    assert_eq!(job.result_track_id.as_deref(), Some("track-1"));
}

#[tokio::test(start_paused = true)]
async fn test_commit_gives_up_after_three_attempts() {
    let gateway = MockGateway::default();
    let prober = MockProber::default();
    let catalog = MockCatalog::flaky(10);
    let orchestrator = orchestrator(&gateway, &prober, &catalog);

    let summary = orchestrator
        .import_selected(vec![ImportCandidate::remote("/music/song.mp3", 1)])
        .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(catalog.attempts(), 3);

    let jobs = orchestrator.jobs().await;
    let job = &jobs[0];
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.progress_percent < 100);
    let job_error = job.error.as_ref().expect("failed job carries error");
    assert_eq!(job_error.kind, ErrorKind::TransientNetwork);
}

#[tokio::test]
async fn test_non_transient_commit_failure_is_not_retried() {
    let gateway = MockGateway::default();
    let prober = MockProber::default();
    let catalog = MockCatalog::broken();
    let orchestrator = orchestrator(&gateway, &prober, &catalog);

    let summary = orchestrator
        .import_selected(vec![ImportCandidate::remote("/music/song.mp3", 1)])
        .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(catalog.attempts(), 1);
}

// =============================================================================
// Retry of failed jobs
// =============================================================================

#[tokio::test]
async fn test_retry_reruns_failed_job_to_success() {
    let gateway = MockGateway::failing("song.mp3", 1);
    let prober = MockProber::default();
    let catalog = MockCatalog::default();
    let orchestrator = orchestrator(&gateway, &prober, &catalog);

    let summary = orchestrator
        .import_selected(vec![ImportCandidate::remote("/music/song.mp3", 1)])
        .await;
    assert_eq!(summary.failed, 1);
    let failed_id = summary.failed_jobs[0];

    orchestrator.retry(failed_id).await.expect("retry accepted");

    let job = orchestrator.job(failed_id).await.expect("job exists");
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.attempt, 2);
    assert!(job.error.is_none());
    assert_eq!(job.progress_percent, 100);

    // The gateway was invoked again for the fresh attempt.
    assert_eq!(gateway.calls().len(), 2);
}

#[tokio::test]
async fn test_retry_rejected_for_non_failed_jobs() {
    let gateway = MockGateway::default();
    let prober = MockProber::default();
    let catalog = MockCatalog::default();
    let orchestrator = orchestrator(&gateway, &prober, &catalog);

    let summary = orchestrator
        .import_selected(vec![ImportCandidate::remote("/music/song.mp3", 1)])
        .await;
    assert_eq!(summary.completed, 1);

    let job_id = orchestrator.jobs().await[0].id;
    let err = orchestrator.retry(job_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = orchestrator.retry(9999).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Other);
}

// =============================================================================
// Auth expiry and local sources
// =============================================================================

#[tokio::test]
async fn test_auth_expiry_notifies_once_per_batch() {
    init_tracing();

    let gateway = MockGateway::default();
    let prober = MockProber::default();
    let catalog = MockCatalog::default();
    let orchestrator = ImportOrchestrator::new(
        MockRemote::expired(),
        gateway.clone(),
        prober.clone(),
        catalog.clone(),
        ImportConfig::default(),
    );

    let summary = orchestrator
        .import_selected(vec![
            ImportCandidate::remote("/music/a.mp3", 1),
            ImportCandidate::remote("/music/b.mp3", 1),
            ImportCandidate::remote("/music/c.mp3", 1),
        ])
        .await;

    assert_eq!(summary.failed, 3);
    for job in orchestrator.jobs().await {
        let job_error = job.error.as_ref().expect("failed job carries error");
        assert_eq!(job_error.kind, ErrorKind::AuthExpired);
    }

    let events = drain_events(&orchestrator).await;
    let auth_events = events
        .iter()
        .filter(|event| matches!(event, ImportEvent::AuthExpired))
        .count();
    assert_eq!(auth_events, 1);
}

#[tokio::test]
async fn test_local_candidate_uploads_bytes() {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = dir.path().join("demo.mp3");
    std::fs::write(&path, b"local mp3 payload").expect("write audio file");

    let gateway = MockGateway::default();
    let prober = MockProber::default();
    let catalog = MockCatalog::default();
    let orchestrator = orchestrator(&gateway, &prober, &catalog);

    let summary = orchestrator
        .import_selected(vec![ImportCandidate::local(&path, 17)])
        .await;

    assert_eq!(summary.completed, 1);
    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].was_bytes);
    assert_eq!(calls[0].endpoint, "store");
    assert_eq!(catalog.records()[0].title, "demo");
}

#[tokio::test]
async fn test_missing_local_file_fails_job() {
    let gateway = MockGateway::default();
    let prober = MockProber::default();
    let catalog = MockCatalog::default();
    let orchestrator = orchestrator(&gateway, &prober, &catalog);

    let summary = orchestrator
        .import_selected(vec![ImportCandidate::local("/nonexistent/ghost.mp3", 0)])
        .await;

    assert_eq!(summary.failed, 1);
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_clear_finished_removes_terminal_jobs() {
    let gateway = MockGateway::failing("bad.mp3", 1);
    let prober = MockProber::default();
    let catalog = MockCatalog::default();
    let orchestrator = orchestrator(&gateway, &prober, &catalog);

    orchestrator
        .import_selected(vec![
            ImportCandidate::remote("/music/good.mp3", 1),
            ImportCandidate::remote("/music/bad.mp3", 1),
        ])
        .await;

    let stats = orchestrator.stats().await;
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 1);

    assert_eq!(orchestrator.clear_finished().await, 2);
    assert!(orchestrator.jobs().await.is_empty());
}

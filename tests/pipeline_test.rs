use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use callscribe::application::ports::{
    AudioFetcher, CallRepository, FetchError, RepositoryError, TranscriptArtifact,
    TranscriptStore, TranscriptStoreError, TranscriptionEngine, TranscriptionError,
};
use callscribe::application::services::{PipelineError, PipelineOptions, PipelineService};
use callscribe::domain::{CallId, CallRecord, FailureKind, RetryPolicy, UserType};

fn record(call_id: i64) -> CallRecord {
    CallRecord {
        call_id: CallId::new(call_id),
        started_at: NaiveDate::from_ymd_opt(2025, 4, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap(),
        ended_at: None,
        user_type: UserType::Customer,
        audio_url: format!("https://cdn/recordings/leg-{}.mp3", call_id),
        branch_name: None,
        handled_by: None,
    }
}

fn range() -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(2025, 4, 10).unwrap(),
        NaiveDate::from_ymd_opt(2025, 4, 10).unwrap(),
    )
}

fn fast_options() -> PipelineOptions {
    PipelineOptions {
        workers: 2,
        chunk_size: 4,
        cleanup_audio: false,
        reprocess: false,
        failure_abort_threshold: 1.0,
        transcription_retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(5),
        },
    }
}

struct MockRepository {
    records: Vec<CallRecord>,
}

#[async_trait]
impl CallRepository for MockRepository {
    async fn calls_in_range(
        &self,
        _start: NaiveDate,
        _end: NaiveDate,
        _custom_query: Option<&str>,
    ) -> Result<Vec<CallRecord>, RepositoryError> {
        Ok(self.records.clone())
    }
}

struct MockFetcher {
    fail_calls: HashSet<i64>,
    fetches: AtomicUsize,
    discards: AtomicUsize,
}

impl MockFetcher {
    fn new(fail_calls: impl IntoIterator<Item = i64>) -> Self {
        Self {
            fail_calls: fail_calls.into_iter().collect(),
            fetches: AtomicUsize::new(0),
            discards: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AudioFetcher for MockFetcher {
    async fn fetch(&self, record: &CallRecord) -> Result<PathBuf, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_calls.contains(&record.call_id.as_i64()) {
            return Err(FetchError::UnexpectedStatus {
                status: 404,
                url: record.audio_url.clone(),
            });
        }
        Ok(PathBuf::from(format!("/audio/leg-{}.mp3", record.call_id)))
    }

    async fn discard(&self, _audio_path: &Path) -> Result<(), FetchError> {
        self.discards.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

enum EngineBehavior {
    Succeed,
    FailPermanently,
    FailTransientlyTimes(usize),
}

struct MockEngine {
    behavior: EngineBehavior,
    calls: AtomicUsize,
}

impl MockEngine {
    fn new(behavior: EngineBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TranscriptionEngine for MockEngine {
    async fn transcribe(&self, _audio_path: &Path) -> Result<String, TranscriptionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            EngineBehavior::Succeed => Ok("transcript text".to_string()),
            EngineBehavior::FailPermanently => {
                Err(TranscriptionError::DecodingFailed("bad audio".to_string()))
            }
            EngineBehavior::FailTransientlyTimes(n) => {
                if call < n {
                    Err(TranscriptionError::ServiceUnavailable("busy".to_string()))
                } else {
                    Ok("transcript text".to_string())
                }
            }
        }
    }
}

struct MockStore {
    existing: HashSet<i64>,
    writes: AtomicUsize,
}

impl MockStore {
    fn new(existing: impl IntoIterator<Item = i64>) -> Self {
        Self {
            existing: existing.into_iter().collect(),
            writes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TranscriptStore for MockStore {
    async fn transcript_exists(&self, record: &CallRecord) -> Result<bool, TranscriptStoreError> {
        Ok(self.existing.contains(&record.call_id.as_i64()))
    }

    async fn write(
        &self,
        record: &CallRecord,
        transcript: &str,
        _audio_path: &Path,
        _overwrite: bool,
    ) -> Result<TranscriptArtifact, TranscriptStoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(TranscriptArtifact {
            transcript_path: PathBuf::from(format!("/text/call_{}/t.txt", record.call_id)),
            metadata_path: PathBuf::from(format!("/text/call_{}/call_metadata.json", record.call_id)),
            transcript_chars: transcript.chars().count(),
        })
    }
}

fn pipeline(
    records: Vec<CallRecord>,
    fetcher: Arc<MockFetcher>,
    engine: Arc<MockEngine>,
    store: Arc<MockStore>,
    options: PipelineOptions,
) -> PipelineService {
    PipelineService::new(
        Arc::new(MockRepository { records }),
        fetcher,
        engine,
        store,
        options,
    )
}

#[tokio::test]
async fn given_processable_records_when_running_then_every_record_is_written() {
    let fetcher = Arc::new(MockFetcher::new([]));
    let engine = Arc::new(MockEngine::new(EngineBehavior::Succeed));
    let store = Arc::new(MockStore::new([]));
    let service = pipeline(
        vec![record(1), record(2), record(3)],
        Arc::clone(&fetcher),
        Arc::clone(&engine),
        Arc::clone(&store),
        fast_options(),
    );
    let (start, end) = range();

    let summary = service
        .run(start, end, None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.written, 3);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.writes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn given_one_unreachable_audio_url_when_running_then_failure_is_recorded_not_fatal() {
    let fetcher = Arc::new(MockFetcher::new([2]));
    let engine = Arc::new(MockEngine::new(EngineBehavior::Succeed));
    let store = Arc::new(MockStore::new([]));
    let service = pipeline(
        vec![record(1), record(2), record(3)],
        Arc::clone(&fetcher),
        Arc::clone(&engine),
        Arc::clone(&store),
        fast_options(),
    );
    let (start, end) = range();

    let summary = service
        .run(start, end, None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.written, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].call_id.as_i64(), 2);
    assert_eq!(summary.failures[0].reason, FailureKind::Fetch);
    // the failed record never reaches the engine
    assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    assert!(!summary.is_clean());
}

#[tokio::test]
async fn given_existing_transcripts_when_running_then_they_are_skipped_without_downloads() {
    let fetcher = Arc::new(MockFetcher::new([]));
    let engine = Arc::new(MockEngine::new(EngineBehavior::Succeed));
    let store = Arc::new(MockStore::new([1, 2]));
    let service = pipeline(
        vec![record(1), record(2), record(3)],
        Arc::clone(&fetcher),
        Arc::clone(&engine),
        Arc::clone(&store),
        fast_options(),
    );
    let (start, end) = range();

    let summary = service
        .run(start, end, None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.written, 1);
    // idempotence: skipped records trigger no fetch and no transcription
    assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn given_transient_backend_failures_when_running_then_transcription_is_retried() {
    let fetcher = Arc::new(MockFetcher::new([]));
    let engine = Arc::new(MockEngine::new(EngineBehavior::FailTransientlyTimes(2)));
    let store = Arc::new(MockStore::new([]));
    let service = pipeline(
        vec![record(1)],
        Arc::clone(&fetcher),
        Arc::clone(&engine),
        Arc::clone(&store),
        fast_options(),
    );
    let (start, end) = range();

    let summary = service
        .run(start, end, None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.written, 1);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn given_permanent_backend_failure_when_running_then_no_retry_happens() {
    let fetcher = Arc::new(MockFetcher::new([]));
    let engine = Arc::new(MockEngine::new(EngineBehavior::FailPermanently));
    let store = Arc::new(MockStore::new([]));
    let service = pipeline(
        vec![record(1)],
        Arc::clone(&fetcher),
        Arc::clone(&engine),
        Arc::clone(&store),
        fast_options(),
    );
    let (start, end) = range();

    let summary = service
        .run(start, end, None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].reason, FailureKind::Transcription);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn given_cleanup_enabled_when_running_then_audio_is_discarded_after_write() {
    let fetcher = Arc::new(MockFetcher::new([]));
    let engine = Arc::new(MockEngine::new(EngineBehavior::Succeed));
    let store = Arc::new(MockStore::new([]));
    let mut options = fast_options();
    options.cleanup_audio = true;
    let service = pipeline(
        vec![record(1), record(2)],
        Arc::clone(&fetcher),
        Arc::clone(&engine),
        Arc::clone(&store),
        options,
    );
    let (start, end) = range();

    service
        .run(start, end, None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(fetcher.discards.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn given_every_record_failing_when_running_then_run_aborts_on_failure_rate() {
    let fetcher = Arc::new(MockFetcher::new([1, 2, 3, 4, 5, 6]));
    let engine = Arc::new(MockEngine::new(EngineBehavior::Succeed));
    let store = Arc::new(MockStore::new([]));
    let mut options = fast_options();
    options.chunk_size = 2;
    options.failure_abort_threshold = 0.5;
    let service = pipeline(
        (1..=6).map(record).collect(),
        Arc::clone(&fetcher),
        Arc::clone(&engine),
        Arc::clone(&store),
        options,
    );
    let (start, end) = range();

    let result = service.run(start, end, None, CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(PipelineError::FailureRateExceeded { .. })
    ));
    // the run stopped after the first chunk crossed the threshold
    assert!(fetcher.fetches.load(Ordering::SeqCst) < 6);
}

#[tokio::test]
async fn given_empty_date_range_when_running_then_summary_is_clean_and_zero() {
    let fetcher = Arc::new(MockFetcher::new([]));
    let engine = Arc::new(MockEngine::new(EngineBehavior::Succeed));
    let store = Arc::new(MockStore::new([]));
    let service = pipeline(
        Vec::new(),
        Arc::clone(&fetcher),
        Arc::clone(&engine),
        Arc::clone(&store),
        fast_options(),
    );
    let (start, end) = range();

    let summary = service
        .run(start, end, None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.total, 0);
    assert!(summary.is_clean());
    assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn given_cancelled_token_when_running_then_no_records_are_dispatched() {
    let fetcher = Arc::new(MockFetcher::new([]));
    let engine = Arc::new(MockEngine::new(EngineBehavior::Succeed));
    let store = Arc::new(MockStore::new([]));
    let service = pipeline(
        vec![record(1), record(2)],
        Arc::clone(&fetcher),
        Arc::clone(&engine),
        Arc::clone(&store),
        fast_options(),
    );
    let (start, end) = range();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = service.run(start, end, None, cancel).await.unwrap();

    assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 0);
    assert_eq!(summary.written, 0);
}

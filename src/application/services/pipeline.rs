use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::application::ports::{
    AudioFetcher, CallRepository, RepositoryError, TranscriptStore, TranscriptionEngine,
    TranscriptionError,
};
use crate::domain::{CallRecord, FailureKind, RecordOutcome, RetryPolicy};

use super::run_report::RunSummary;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Records in flight at once.
    pub workers: usize,
    /// Records dispatched per batch; bounds peak resource usage.
    pub chunk_size: usize,
    /// Delete downloaded audio after a successful write.
    pub cleanup_audio: bool,
    /// Re-transcribe legs that already have a transcript.
    pub reprocess: bool,
    /// Abort the run once the failure ratio crosses this threshold,
    /// evaluated after each chunk once a full chunk has been attempted.
    pub failure_abort_threshold: f64,
    pub transcription_retry: RetryPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            chunk_size: 16,
            cleanup_audio: false,
            reprocess: false,
            failure_abort_threshold: 0.9,
            transcription_retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("database: {0}")]
    Repository(#[from] RepositoryError),
    #[error(
        "aborted: {failed} of {attempted} records failed ({rate:.0}%), above the {threshold:.0}% threshold"
    )]
    FailureRateExceeded {
        failed: usize,
        attempted: usize,
        rate: f64,
        threshold: f64,
    },
}

/// Sequences fetch → transcribe → write across all records of a date range
/// with a bounded worker pool. Record-scoped failures are tallied, never
/// fatal; the run only aborts on database errors or a runaway failure rate.
pub struct PipelineService {
    repository: Arc<dyn CallRepository>,
    fetcher: Arc<dyn AudioFetcher>,
    engine: Arc<dyn TranscriptionEngine>,
    store: Arc<dyn TranscriptStore>,
    options: PipelineOptions,
}

impl PipelineService {
    pub fn new(
        repository: Arc<dyn CallRepository>,
        fetcher: Arc<dyn AudioFetcher>,
        engine: Arc<dyn TranscriptionEngine>,
        store: Arc<dyn TranscriptStore>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            repository,
            fetcher,
            engine,
            store,
            options,
        }
    }

    /// The database reader step on its own, used by dry runs and by `run`.
    pub async fn plan(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        custom_query: Option<&str>,
    ) -> Result<Vec<CallRecord>, PipelineError> {
        Ok(self
            .repository
            .calls_in_range(start, end, custom_query)
            .await?)
    }

    pub async fn run(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        custom_query: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        let records = self.plan(start, end, custom_query).await?;
        let total = records.len();
        tracing::info!(total, %start, %end, "Processing call records");

        let workers = self.options.workers.max(1);
        let chunk_size = self.options.chunk_size.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut outcomes: Vec<RecordOutcome> = Vec::with_capacity(total);

        'chunks: for chunk in records.chunks(chunk_size) {
            let mut in_flight = JoinSet::new();
            for record in chunk {
                if cancel.is_cancelled() {
                    tracing::warn!("Cancellation requested, no further records dispatched");
                    break;
                }
                let permit = match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break 'chunks,
                };
                let worker = self.worker();
                let record = record.clone();
                in_flight.spawn(async move {
                    let _permit = permit;
                    worker.process(record).await
                });
            }

            while let Some(joined) = in_flight.join_next().await {
                match joined {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => tracing::error!(error = %e, "Record task failed to complete"),
                }
            }

            if cancel.is_cancelled() {
                break;
            }

            let attempted = outcomes.len();
            let failed = outcomes.iter().filter(|o| o.is_failed()).count();
            if attempted >= chunk_size && attempted > 0 {
                let rate = failed as f64 / attempted as f64;
                if rate > self.options.failure_abort_threshold {
                    tracing::error!(
                        failed,
                        attempted,
                        "Failure rate above threshold, aborting run"
                    );
                    return Err(PipelineError::FailureRateExceeded {
                        failed,
                        attempted,
                        rate: rate * 100.0,
                        threshold: self.options.failure_abort_threshold * 100.0,
                    });
                }
            }
        }

        let summary = RunSummary::from_outcomes(
            start,
            end,
            total,
            &outcomes,
            started.elapsed().as_secs_f64(),
        );
        tracing::info!(
            written = summary.written,
            skipped = summary.skipped,
            failed = summary.failed,
            elapsed_secs = summary.elapsed_secs,
            "Run finished"
        );
        Ok(summary)
    }

    fn worker(&self) -> RecordWorker {
        RecordWorker {
            fetcher: Arc::clone(&self.fetcher),
            engine: Arc::clone(&self.engine),
            store: Arc::clone(&self.store),
            cleanup_audio: self.options.cleanup_audio,
            reprocess: self.options.reprocess,
            retry: self.options.transcription_retry,
        }
    }
}

struct RecordWorker {
    fetcher: Arc<dyn AudioFetcher>,
    engine: Arc<dyn TranscriptionEngine>,
    store: Arc<dyn TranscriptStore>,
    cleanup_audio: bool,
    reprocess: bool,
    retry: RetryPolicy,
}

impl RecordWorker {
    /// Drives one record through its lifecycle: queued → fetching → fetched
    /// → transcribing → transcribed → written, with terminal failure exits
    /// from the fetching, transcribing, and writing steps.
    async fn process(&self, record: CallRecord) -> RecordOutcome {
        let span = tracing::info_span!(
            "call_record",
            call_id = %record.call_id,
            user_type = %record.user_type,
        );
        self.process_inner(record).instrument(span).await
    }

    async fn process_inner(&self, record: CallRecord) -> RecordOutcome {
        let call_id = record.call_id;

        if !self.reprocess {
            match self.store.transcript_exists(&record).await {
                Ok(true) => {
                    tracing::info!("Transcript already present, skipping");
                    return RecordOutcome::Skipped { call_id };
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Could not check for an existing transcript");
                    return RecordOutcome::Failed {
                        call_id,
                        kind: FailureKind::Write,
                        message: e.to_string(),
                    };
                }
            }
        }

        let audio_path = match self.fetcher.fetch(&record).await {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(error = %e, url = %record.audio_url, "Audio fetch failed");
                return RecordOutcome::Failed {
                    call_id,
                    kind: FailureKind::Fetch,
                    message: e.to_string(),
                };
            }
        };

        let transcript = match self.transcribe_with_retry(&audio_path).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, path = %audio_path.display(), "Transcription failed");
                return RecordOutcome::Failed {
                    call_id,
                    kind: FailureKind::Transcription,
                    message: e.to_string(),
                };
            }
        };

        let artifact = match self
            .store
            .write(&record, &transcript, &audio_path, self.reprocess)
            .await
        {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::error!(error = %e, "Transcript write failed");
                return RecordOutcome::Failed {
                    call_id,
                    kind: FailureKind::Write,
                    message: e.to_string(),
                };
            }
        };

        if self.cleanup_audio {
            if let Err(e) = self.fetcher.discard(&audio_path).await {
                tracing::warn!(
                    error = %e,
                    path = %audio_path.display(),
                    "Could not delete audio after transcription"
                );
            }
        }

        tracing::info!(
            chars = artifact.transcript_chars,
            path = %artifact.transcript_path.display(),
            "Transcript written"
        );
        RecordOutcome::Written {
            call_id,
            transcript_path: artifact.transcript_path,
        }
    }

    async fn transcribe_with_retry(
        &self,
        audio_path: &std::path::Path,
    ) -> Result<String, TranscriptionError> {
        let mut attempt = 1;
        loop {
            match self.engine.transcribe(audio_path).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff_for(attempt);
                    tracing::warn!(
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient transcription failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use tokio::fs;

use crate::application::ports::{TranscriptArtifact, TranscriptStore, TranscriptStoreError};
use crate::domain::{artifact_path, CallRecord};

/// Writes transcript artifacts under
/// `<root>/<YYYY>/<MM>/<DD>/call_<call_id>/`. Directory creation is
/// idempotent; transcripts are never replaced unless explicitly asked.
pub struct FsTranscriptStore {
    transcript_root: PathBuf,
}

/// Sidecar document describing one transcribed leg, written next to the
/// transcript so artifacts remain self-describing without the database.
#[derive(Serialize)]
struct CallMetadata<'a> {
    call_id: i64,
    user_type: &'a str,
    started_at: NaiveDateTime,
    duration_secs: Option<i64>,
    audio_url: &'a str,
    audio_path: String,
    transcript_path: String,
    branch_name: Option<&'a str>,
    handled_by: Option<&'a str>,
    transcript_chars: usize,
    processed_at: DateTime<Utc>,
}

impl FsTranscriptStore {
    pub fn new(transcript_root: PathBuf) -> Self {
        Self { transcript_root }
    }
}

#[async_trait]
impl TranscriptStore for FsTranscriptStore {
    async fn transcript_exists(&self, record: &CallRecord) -> Result<bool, TranscriptStoreError> {
        let path = artifact_path::transcript_path(&self.transcript_root, record);
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.len() > 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(
        &self,
        record: &CallRecord,
        transcript: &str,
        audio_path: &Path,
        overwrite: bool,
    ) -> Result<TranscriptArtifact, TranscriptStoreError> {
        let dir = artifact_path::transcript_dir(&self.transcript_root, record);
        fs::create_dir_all(&dir).await?;

        let transcript_path =
            dir.join(artifact_path::transcript_file_name(&record.user_type, &record.audio_url));
        if !overwrite && fs::try_exists(&transcript_path).await? {
            return Err(TranscriptStoreError::AlreadyExists(transcript_path));
        }
        fs::write(&transcript_path, transcript).await?;

        let transcript_chars = transcript.chars().count();
        let metadata_path = dir.join(artifact_path::METADATA_FILE_NAME);
        let metadata = CallMetadata {
            call_id: record.call_id.as_i64(),
            user_type: record.user_type.label(),
            started_at: record.started_at,
            duration_secs: record.duration_secs(),
            audio_url: &record.audio_url,
            audio_path: audio_path.display().to_string(),
            transcript_path: transcript_path.display().to_string(),
            branch_name: record.branch_name.as_deref(),
            handled_by: record.handled_by.as_deref(),
            transcript_chars,
            processed_at: Utc::now(),
        };
        let body = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| TranscriptStoreError::Metadata(e.to_string()))?;
        fs::write(&metadata_path, body).await?;

        tracing::debug!(
            transcript = %transcript_path.display(),
            metadata = %metadata_path.display(),
            "Transcript artifact stored"
        );
        Ok(TranscriptArtifact {
            transcript_path,
            metadata_path,
            transcript_chars,
        })
    }
}

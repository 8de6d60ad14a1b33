use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::CallRecord;

/// Paths produced for one transcribed leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptArtifact {
    pub transcript_path: PathBuf,
    pub metadata_path: PathBuf,
    pub transcript_chars: usize,
}

/// Persists transcript text plus its metadata sidecar into the call-scoped
/// output directory.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Whether a non-empty transcript already exists for this leg. Drives
    /// the skip logic that makes re-runs resumable.
    async fn transcript_exists(&self, record: &CallRecord) -> Result<bool, TranscriptStoreError>;

    /// Write the transcript verbatim and the `call_metadata.json` sidecar.
    /// Refuses to replace an existing transcript unless `overwrite` is set.
    async fn write(
        &self,
        record: &CallRecord,
        transcript: &str,
        audio_path: &Path,
        overwrite: bool,
    ) -> Result<TranscriptArtifact, TranscriptStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TranscriptStoreError {
    #[error("transcript already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("metadata serialization failed: {0}")]
    Metadata(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

use std::path::Path;

use async_trait::async_trait;

/// Speech-to-text backend. Both operating modes (embedded model, persistent
/// HTTP service) expose the same contract: a local audio file in, plain
/// transcript text out.
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscriptionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("audio file unreadable: {0}")]
    UnreadableAudio(String),
    #[error("audio decoding failed: {0}")]
    DecodingFailed(String),
    #[error("model loading failed: {0}")]
    ModelLoadFailed(String),
    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),
    #[error("api request failed: {0}")]
    ApiRequestFailed(String),
    #[error("transcription service not ready: {0}")]
    ServiceUnavailable(String),
}

impl TranscriptionError {
    /// Transient failures are worth a bounded retry; everything else is a
    /// permanent failure for the record.
    pub fn is_transient(&self) -> bool {
        matches!(self, TranscriptionError::ServiceUnavailable(_))
    }
}

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::CallRecord;

/// Retrieves a record's audio payload to its deterministic local path.
///
/// Fetching is idempotent: when a non-empty file already exists at the
/// destination, implementations return it without re-downloading.
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn fetch(&self, record: &CallRecord) -> Result<PathBuf, FetchError>;

    /// Remove a previously fetched audio file (post-transcription cleanup).
    async fn discard(&self, audio_path: &Path) -> Result<(), FetchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid audio url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

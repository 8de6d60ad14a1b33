mod audio_fetcher;
mod call_repository;
mod transcript_store;
mod transcription_engine;

pub use audio_fetcher::{AudioFetcher, FetchError};
pub use call_repository::{CallRepository, RepositoryError};
pub use transcript_store::{TranscriptArtifact, TranscriptStore, TranscriptStoreError};
pub use transcription_engine::{TranscriptionEngine, TranscriptionError};

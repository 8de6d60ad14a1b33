pub mod audio_decoder;
mod engine_factory;
mod local_whisper_engine;
mod whisper_service_engine;

pub use engine_factory::{TranscriptionEngineFactory, TranscriptionMode};
pub use local_whisper_engine::LocalWhisperEngine;
pub use whisper_service_engine::WhisperServiceEngine;

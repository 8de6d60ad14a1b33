use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{TranscriptionEngine, TranscriptionError};

use super::local_whisper_engine::LocalWhisperEngine;
use super::whisper_service_engine::WhisperServiceEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptionMode {
    Embedded,
    Service,
}

impl TryFrom<String> for TranscriptionMode {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "embedded" | "local" => Ok(Self::Embedded),
            "service" | "remote" => Ok(Self::Service),
            other => Err(format!(
                "Invalid transcription mode: {}. Expected: embedded or service",
                other
            )),
        }
    }
}

pub struct TranscriptionEngineFactory;

impl TranscriptionEngineFactory {
    pub async fn create(
        mode: TranscriptionMode,
        model_id: &str,
        language: Option<String>,
        service_url: &str,
        service_wait: Duration,
    ) -> Result<Arc<dyn TranscriptionEngine>, TranscriptionError> {
        match mode {
            TranscriptionMode::Embedded => {
                Ok(Arc::new(LocalWhisperEngine::new(model_id, language)))
            }
            TranscriptionMode::Service => Ok(Arc::new(
                WhisperServiceEngine::connect(service_url, service_wait).await?,
            )),
        }
    }
}

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;

use crate::application::ports::{TranscriptionEngine, TranscriptionError};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);
const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(300);

/// Service-mode transcription: a persistent out-of-process service keeps
/// the model resident across runs; this client posts audio to it.
pub struct WhisperServiceEngine {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct TranscribeResponse {
    transcript: String,
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    model: Option<String>,
}

impl WhisperServiceEngine {
    /// Probe the service before accepting work. Connection refusal means
    /// "service not ready": fail fast after the bounded wait instead of
    /// hanging, and tell the operator how to fix it.
    pub async fn connect(
        base_url: &str,
        startup_wait: Duration,
    ) -> Result<Self, TranscriptionError> {
        let engine = Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        };

        let deadline = tokio::time::Instant::now() + startup_wait;
        let mut delay = Duration::from_millis(500);
        loop {
            match engine.probe_health().await {
                Ok(health) => {
                    tracing::info!(
                        status = %health.status,
                        model = health.model.as_deref().unwrap_or("unknown"),
                        "Connected to transcription service"
                    );
                    return Ok(engine);
                }
                Err(reason) => {
                    if tokio::time::Instant::now() + delay >= deadline {
                        return Err(TranscriptionError::ServiceUnavailable(format!(
                            "{} did not become ready within {}s ({}); start it with `callscribe service start`",
                            engine.base_url,
                            startup_wait.as_secs(),
                            reason
                        )));
                    }
                    tracing::debug!(reason = %reason, "Transcription service not ready yet");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(5));
                }
            }
        }
    }

    async fn probe_health(&self) -> Result<HealthResponse, String> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("health returned status {}", response.status()));
        }
        response.json().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl TranscriptionEngine for WhisperServiceEngine {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscriptionError> {
        let data = tokio::fs::read(audio_path).await.map_err(|e| {
            TranscriptionError::UnreadableAudio(format!("{}: {}", audio_path.display(), e))
        })?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        let part = multipart::Part::bytes(data)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .map_err(|e| TranscriptionError::ApiRequestFailed(format!("mime: {}", e)))?;
        let form = multipart::Form::new().part("file", part);

        tracing::debug!(path = %audio_path.display(), "Sending audio to transcription service");

        let response = self
            .client
            .post(format!("{}/transcribe", self.base_url))
            .multipart(form)
            .timeout(TRANSCRIBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    TranscriptionError::ServiceUnavailable(format!(
                        "{} refused the connection; start it with `callscribe service start`",
                        self.base_url
                    ))
                } else {
                    TranscriptionError::ApiRequestFailed(format!("request: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(match status.as_u16() {
                422 => TranscriptionError::DecodingFailed(body),
                503 => TranscriptionError::ServiceUnavailable(body),
                _ => TranscriptionError::ApiRequestFailed(format!("status {}: {}", status, body)),
            });
        }

        let result: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::ApiRequestFailed(format!("parse response: {}", e)))?;

        tracing::info!(chars = result.transcript.len(), "Service transcription completed");
        Ok(result.transcript.trim().to_string())
    }
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::application::ports::{AudioFetcher, FetchError};
use crate::domain::{artifact_path, CallRecord, RetryPolicy};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Downloads call audio into the date-partitioned local tree.
///
/// The payload is streamed to `<dest>.part` and renamed into place once
/// complete, so an interrupted run never leaves a truncated file that a
/// later run would mistake for a finished download.
pub struct HttpAudioFetcher {
    client: reqwest::Client,
    audio_root: PathBuf,
    base_url: Option<String>,
    retry: RetryPolicy,
}

impl HttpAudioFetcher {
    pub fn new(audio_root: PathBuf, base_url: Option<String>, retry: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            audio_root,
            base_url,
            retry,
        }
    }

    fn resolve_url(&self, raw: &str) -> Result<String, FetchError> {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(raw.to_string());
        }
        match &self.base_url {
            Some(base) => Ok(format!(
                "{}/{}",
                base.trim_end_matches('/'),
                raw.trim_start_matches('/')
            )),
            None => Err(FetchError::InvalidUrl {
                url: raw.to_string(),
                reason: "relative audio url and no AUDIO_BASE_URL configured".to_string(),
            }),
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let mut part = dest.as_os_str().to_owned();
        part.push(".part");
        let part = PathBuf::from(part);

        let response = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| FetchError::RequestFailed(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(FetchError::UnexpectedStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let mut file = fs::File::create(&part).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => file.write_all(&bytes).await?,
                Err(e) => {
                    drop(file);
                    let _ = fs::remove_file(&part).await;
                    return Err(FetchError::RequestFailed(format!("{}: {}", url, e)));
                }
            }
        }
        file.flush().await?;
        drop(file);

        fs::rename(&part, dest).await?;
        Ok(())
    }
}

#[async_trait]
impl AudioFetcher for HttpAudioFetcher {
    async fn fetch(&self, record: &CallRecord) -> Result<PathBuf, FetchError> {
        let dest = artifact_path::audio_path(&self.audio_root, record);

        if let Ok(meta) = fs::metadata(&dest).await {
            if meta.len() > 0 {
                tracing::debug!(path = %dest.display(), "Audio already present, skipping download");
                return Ok(dest);
            }
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let url = self.resolve_url(&record.audio_url)?;
        let mut attempt = 1;
        loop {
            match self.download(&url, &dest).await {
                Ok(()) => {
                    tracing::info!(url = %url, path = %dest.display(), "Audio downloaded");
                    return Ok(dest);
                }
                Err(e @ FetchError::InvalidUrl { .. }) => return Err(e),
                Err(e) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff_for(attempt);
                    tracing::warn!(
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Audio download failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn discard(&self, audio_path: &Path) -> Result<(), FetchError> {
        fs::remove_file(audio_path).await?;
        tracing::debug!(path = %audio_path.display(), "Audio file deleted");
        Ok(())
    }
}

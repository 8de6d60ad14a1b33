use std::path::PathBuf;
use std::time::Duration;

use crate::infrastructure::audio::TranscriptionMode;
use crate::infrastructure::persistence::DatabaseConfig;

/// Runtime configuration, read from the environment at startup. Missing
/// required values or unparsable ones are fatal before any work starts.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseConfig,
    /// Prefix for relative `audio_url` values.
    pub audio_base_url: Option<String>,
    pub audio_root: PathBuf,
    pub transcript_root: PathBuf,
    pub report_dir: PathBuf,
    /// Hugging Face repo id of the whisper model for embedded mode and the
    /// built-in service.
    pub whisper_model: String,
    /// Hint for the decoder; the source system records Spanish calls.
    pub language: Option<String>,
    pub transcription_mode: TranscriptionMode,
    pub service_url: String,
    /// How long a pipeline run waits for the service health probe before
    /// failing fast.
    pub service_startup_wait: Duration,
    /// How long `service start` waits for the spawned process to become
    /// healthy; model loading dominates this.
    pub service_start_timeout: Duration,
    /// Where the service supervisor keeps its PID and log files.
    pub state_dir: PathBuf,
    pub workers: usize,
    pub chunk_size: usize,
    pub cleanup_audio: bool,
    pub failure_abort_threshold: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: `{value}` ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary lookup. Lets tests exercise the
    /// parsing without mutating process-wide environment state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database = DatabaseConfig {
            host: lookup("MYSQL_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: parse_or(&lookup, "MYSQL_PORT", 3306)?,
            user: lookup("MYSQL_USER").unwrap_or_else(|| "root".to_string()),
            password: lookup("MYSQL_PASSWORD").unwrap_or_default(),
            database: lookup("MYSQL_DATABASE").ok_or(ConfigError::Missing("MYSQL_DATABASE"))?,
            max_connections: parse_or(&lookup, "MYSQL_MAX_CONNECTIONS", 5)?,
        };

        let transcription_mode = match lookup("TRANSCRIPTION_MODE") {
            Some(raw) => {
                TranscriptionMode::try_from(raw.clone()).map_err(|reason| ConfigError::Invalid {
                    key: "TRANSCRIPTION_MODE",
                    value: raw,
                    reason,
                })?
            }
            None => TranscriptionMode::Embedded,
        };

        let workers = parse_or(&lookup, "MAX_WORKERS", 4usize)?;
        if workers == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_WORKERS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let chunk_size = parse_or(&lookup, "CHUNK_SIZE", 16usize)?;
        if chunk_size == 0 {
            return Err(ConfigError::Invalid {
                key: "CHUNK_SIZE",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let failure_abort_threshold = parse_or(&lookup, "FAILURE_ABORT_THRESHOLD", 0.9f64)?;
        if !(0.0..=1.0).contains(&failure_abort_threshold) {
            return Err(ConfigError::Invalid {
                key: "FAILURE_ABORT_THRESHOLD",
                value: failure_abort_threshold.to_string(),
                reason: "must be between 0 and 1".to_string(),
            });
        }

        Ok(Self {
            database,
            audio_base_url: lookup("AUDIO_BASE_URL").filter(|v| !v.trim().is_empty()),
            audio_root: path_or(&lookup, "AUDIO_DOWNLOAD_PATH", "./audio"),
            transcript_root: path_or(&lookup, "TEXT_OUTPUT_PATH", "./transcripts"),
            report_dir: path_or(&lookup, "REPORT_PATH", "./reports"),
            whisper_model: lookup("WHISPER_MODEL")
                .unwrap_or_else(|| "openai/whisper-base".to_string()),
            language: match lookup("WHISPER_LANGUAGE") {
                Some(value) if value.trim().is_empty() => None,
                Some(value) => Some(value),
                None => Some("es".to_string()),
            },
            transcription_mode,
            service_url: lookup("WHISPER_SERVICE_URL")
                .unwrap_or_else(|| "http://localhost:8000".to_string()),
            service_startup_wait: Duration::from_secs(parse_or(
                &lookup,
                "SERVICE_STARTUP_WAIT_SECS",
                15u64,
            )?),
            service_start_timeout: Duration::from_secs(parse_or(
                &lookup,
                "SERVICE_START_TIMEOUT_SECS",
                300u64,
            )?),
            state_dir: lookup("SERVICE_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            workers,
            chunk_size,
            cleanup_audio: bool_or(&lookup, "CLEANUP_AUDIO", false)?,
            failure_abort_threshold,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn path_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> PathBuf {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

fn bool_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key,
                value: raw,
                reason: "expected a boolean (true/false)".to_string(),
            }),
        },
        None => Ok(default),
    }
}

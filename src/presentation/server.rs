use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::application::ports::{TranscriptionEngine, TranscriptionError};

const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// State of the built-in transcription service: one resident engine shared
/// by all requests.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn TranscriptionEngine>,
    pub model: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/transcribe", post(transcribe_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ready",
            model: state.model.clone(),
        }),
    )
}

#[derive(Serialize)]
struct TranscribeResponse {
    transcript: String,
    chars: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

async fn transcribe_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Response {
    let mut upload: Option<(String, Vec<u8>)> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("file") {
                    continue;
                }
                let file_name = field.file_name().unwrap_or("audio").to_string();
                match field.bytes().await {
                    Ok(bytes) => upload = Some((file_name, bytes.to_vec())),
                    Err(e) => {
                        return error_response(
                            StatusCode::BAD_REQUEST,
                            format!("could not read upload: {}", e),
                        );
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("invalid multipart body: {}", e),
                );
            }
        }
    }

    let Some((file_name, data)) = upload else {
        return error_response(StatusCode::BAD_REQUEST, "missing multipart field `file`");
    };
    if data.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "uploaded audio is empty");
    }

    // the engine contract takes a path, so stage the upload to a temp file
    let staged = match stage_upload(&file_name, &data) {
        Ok(staged) => staged,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("could not stage upload: {}", e),
            );
        }
    };

    tracing::info!(file = %file_name, bytes = data.len(), "Transcription request received");

    match state.engine.transcribe(staged.path()).await {
        Ok(transcript) => (
            StatusCode::OK,
            Json(TranscribeResponse {
                chars: transcript.chars().count(),
                transcript,
            }),
        )
            .into_response(),
        Err(
            e @ (TranscriptionError::DecodingFailed(_) | TranscriptionError::UnreadableAudio(_)),
        ) => error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn stage_upload(file_name: &str, data: &[u8]) -> std::io::Result<tempfile::NamedTempFile> {
    let suffix = Path::new(file_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let mut file = tempfile::Builder::new()
        .prefix("callscribe-upload-")
        .suffix(&suffix)
        .tempfile()?;
    file.write_all(data)?;
    file.flush()?;
    Ok(file)
}

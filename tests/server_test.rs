use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use callscribe::application::ports::{TranscriptionEngine, TranscriptionError};
use callscribe::presentation::{create_router, AppState};

struct EchoLengthEngine;

#[async_trait]
impl TranscriptionEngine for EchoLengthEngine {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscriptionError> {
        let data = tokio::fs::read(audio_path)
            .await
            .map_err(|e| TranscriptionError::UnreadableAudio(e.to_string()))?;
        Ok(format!("received {} bytes", data.len()))
    }
}

struct RejectingEngine;

#[async_trait]
impl TranscriptionEngine for RejectingEngine {
    async fn transcribe(&self, _audio_path: &Path) -> Result<String, TranscriptionError> {
        Err(TranscriptionError::DecodingFailed("not audio".to_string()))
    }
}

async fn start_service(engine: Arc<dyn TranscriptionEngine>) -> (String, oneshot::Sender<()>) {
    let router = create_router(AppState {
        engine,
        model: "openai/whisper-base".to_string(),
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .ok();
    });
    (format!("http://{}", addr), shutdown_tx)
}

#[tokio::test]
async fn given_running_service_when_probing_health_then_model_is_reported() {
    let (base_url, shutdown_tx) = start_service(Arc::new(EchoLengthEngine)).await;

    let response = reqwest::get(format!("{}/health", base_url)).await.unwrap();
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();

    assert_eq!(body["status"], "ready");
    assert_eq!(body["model"], "openai/whisper-base");
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn given_audio_upload_when_transcribing_then_transcript_json_is_returned() {
    let (base_url, shutdown_tx) = start_service(Arc::new(EchoLengthEngine)).await;

    let part = reqwest::multipart::Part::bytes(b"0123456789".to_vec())
        .file_name("leg.mp3")
        .mime_str("application/octet-stream")
        .unwrap();
    let form = reqwest::multipart::Form::new().part("file", part);
    let response = reqwest::Client::new()
        .post(format!("{}/transcribe", base_url))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["transcript"], "received 10 bytes");
    assert_eq!(body["chars"], "received 10 bytes".chars().count());
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn given_request_without_file_field_when_transcribing_then_it_is_a_bad_request() {
    let (base_url, shutdown_tx) = start_service(Arc::new(EchoLengthEngine)).await;

    let form = reqwest::multipart::Form::new().text("language", "es");
    let response = reqwest::Client::new()
        .post(format!("{}/transcribe", base_url))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn given_undecodable_audio_when_transcribing_then_status_is_unprocessable() {
    let (base_url, shutdown_tx) = start_service(Arc::new(RejectingEngine)).await;

    let part = reqwest::multipart::Part::bytes(b"not audio at all".to_vec())
        .file_name("leg.txt")
        .mime_str("application/octet-stream")
        .unwrap();
    let form = reqwest::multipart::Form::new().part("file", part);
    let response = reqwest::Client::new()
        .post(format!("{}/transcribe", base_url))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 422);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("decoding"));
    shutdown_tx.send(()).ok();
}

use std::io::Write;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use callscribe::application::ports::{TranscriptionEngine, TranscriptionError};
use callscribe::infrastructure::audio::WhisperServiceEngine;

async fn start_mock_service(
    transcribe_status: u16,
    transcribe_body: serde_json::Value,
) -> (String, oneshot::Sender<()>) {
    let app = Router::new()
        .route(
            "/health",
            get(|| async { Json(json!({"status": "ready", "model": "openai/whisper-base"})) }),
        )
        .route(
            "/transcribe",
            post(move || async move {
                let status = StatusCode::from_u16(transcribe_status).unwrap();
                (status, Json(transcribe_body.clone())).into_response()
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .ok();
    });

    (format!("http://{}", addr), shutdown_tx)
}

fn temp_audio() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".mp3").tempfile().unwrap();
    file.write_all(b"fake audio bytes").unwrap();
    file
}

#[tokio::test]
async fn given_healthy_service_when_connecting_then_engine_is_ready() {
    let (base_url, shutdown_tx) =
        start_mock_service(200, json!({"transcript": "hola"})).await;

    let result = WhisperServiceEngine::connect(&base_url, Duration::from_secs(2)).await;

    assert!(result.is_ok());
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn given_no_service_when_connecting_then_it_fails_fast_with_guidance() {
    // nothing is listening on this port
    let result =
        WhisperServiceEngine::connect("http://127.0.0.1:59123", Duration::from_millis(600)).await;

    match result {
        Err(TranscriptionError::ServiceUnavailable(message)) => {
            assert!(message.contains("service start"), "message: {}", message);
        }
        other => panic!("expected ServiceUnavailable, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn given_running_service_when_transcribing_then_text_is_returned() {
    let (base_url, shutdown_tx) =
        start_mock_service(200, json!({"transcript": "  hola, buenos días  "})).await;
    let engine = WhisperServiceEngine::connect(&base_url, Duration::from_secs(2))
        .await
        .unwrap();
    let audio = temp_audio();

    let transcript = engine.transcribe(audio.path()).await.unwrap();

    assert_eq!(transcript, "hola, buenos días");
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn given_service_overload_when_transcribing_then_error_is_transient() {
    let (base_url, shutdown_tx) =
        start_mock_service(503, json!({"error": "model busy"})).await;
    let engine = WhisperServiceEngine::connect(&base_url, Duration::from_secs(2))
        .await
        .unwrap();
    let audio = temp_audio();

    let result = engine.transcribe(audio.path()).await;

    match result {
        Err(e) => assert!(e.is_transient(), "expected transient error, got {}", e),
        Ok(_) => panic!("expected failure"),
    }
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn given_undecodable_audio_when_transcribing_then_failure_is_permanent() {
    let (base_url, shutdown_tx) =
        start_mock_service(422, json!({"error": "audio decoding failed"})).await;
    let engine = WhisperServiceEngine::connect(&base_url, Duration::from_secs(2))
        .await
        .unwrap();
    let audio = temp_audio();

    let result = engine.transcribe(audio.path()).await;

    match result {
        Err(e) => assert!(!e.is_transient(), "expected permanent error, got {}", e),
        Ok(_) => panic!("expected failure"),
    }
    shutdown_tx.send(()).ok();
}

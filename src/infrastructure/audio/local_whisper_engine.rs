use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;
use tokio::sync::{Mutex, OnceCell};

use crate::application::ports::{TranscriptionEngine, TranscriptionError};

use super::audio_decoder;

const MEL_FILTERS_REPO: &str = "FL33TW00D-HF/whisper-base";
const MAX_DECODE_TOKENS: usize = 224;

/// Embedded transcription: the whisper model is loaded into this process on
/// the first request and stays resident for the rest of the run.
///
/// The model is a single shared resource guarded by a mutex; inference
/// calls are serialized regardless of how many pipeline workers run, since
/// the decoder mutates its KV cache.
pub struct LocalWhisperEngine {
    model_id: String,
    language: Option<String>,
    loaded: OnceCell<Arc<LoadedModel>>,
}

struct LoadedModel {
    model: Mutex<m::model::Whisper>,
    tokenizer: Tokenizer,
    config: Config,
    device: Device,
    mel_filters: Vec<f32>,
}

impl LocalWhisperEngine {
    pub fn new(model_id: impl Into<String>, language: Option<String>) -> Self {
        Self {
            model_id: model_id.into(),
            language,
            loaded: OnceCell::new(),
        }
    }

    /// Load the model now instead of on the first transcription request.
    /// The built-in service calls this so its health endpoint only reports
    /// ready once the model is resident.
    pub async fn preload(&self) -> Result<(), TranscriptionError> {
        self.loaded_model().await.map(|_| ())
    }

    async fn loaded_model(&self) -> Result<Arc<LoadedModel>, TranscriptionError> {
        self.loaded
            .get_or_try_init(|| async {
                let model_id = self.model_id.clone();
                tokio::task::spawn_blocking(move || load_model(&model_id).map(Arc::new))
                    .await
                    .map_err(|e| {
                        TranscriptionError::ModelLoadFailed(format!("load task: {}", e))
                    })?
            })
            .await
            .map(Arc::clone)
    }

    fn prompt_tokens(&self, loaded: &LoadedModel) -> Result<Vec<u32>, TranscriptionError> {
        let mut tokens = vec![token_id(&loaded.tokenizer, m::SOT_TOKEN)?];
        if let Some(language) = &self.language {
            let tag = format!("<|{}|>", language);
            match loaded.tokenizer.token_to_id(&tag) {
                Some(id) => tokens.push(id),
                None => {
                    tracing::warn!(language = %language, "Language token unknown to the tokenizer, decoding without it");
                }
            }
        }
        tokens.push(token_id(&loaded.tokenizer, m::TRANSCRIBE_TOKEN)?);
        tokens.push(token_id(&loaded.tokenizer, m::NO_TIMESTAMPS_TOKEN)?);
        Ok(tokens)
    }
}

#[async_trait]
impl TranscriptionEngine for LocalWhisperEngine {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscriptionError> {
        let data = tokio::fs::read(audio_path).await.map_err(|e| {
            TranscriptionError::UnreadableAudio(format!("{}: {}", audio_path.display(), e))
        })?;
        if data.is_empty() {
            return Err(TranscriptionError::UnreadableAudio(format!(
                "{}: empty file",
                audio_path.display()
            )));
        }

        let loaded = self.loaded_model().await?;
        let pcm = audio_decoder::decode_to_mono_16k(&data)?;

        // one mel spectrogram per 30-second window
        let mut windows = Vec::new();
        for chunk in pcm.chunks(m::N_SAMPLES) {
            let mut samples = chunk.to_vec();
            samples.resize(m::N_SAMPLES, 0.0);
            let mel = m::audio::pcm_to_mel(&loaded.config, &samples, &loaded.mel_filters);
            let n_mel = loaded.config.num_mel_bins;
            let frames = mel.len() / n_mel;
            let tensor =
                Tensor::from_vec(mel, (1, n_mel, frames), &loaded.device).map_err(tensor_err)?;
            windows.push(tensor);
        }

        let prompt = self.prompt_tokens(&loaded)?;
        let mut segments = Vec::new();
        {
            let mut model = loaded.model.lock().await;
            for (index, mel) in windows.iter().enumerate() {
                tracing::debug!(window = index, "Decoding audio window");
                let text =
                    decode_window(&mut model, &loaded.tokenizer, &loaded.device, mel, &prompt)?;
                if !text.is_empty() {
                    segments.push(text);
                }
            }
        }

        let transcript = segments.join(" ");
        tracing::info!(
            windows = windows.len(),
            chars = transcript.len(),
            "Transcription completed"
        );
        Ok(transcript)
    }
}

fn load_model(model_id: &str) -> Result<LoadedModel, TranscriptionError> {
    let device = Device::Cpu;
    tracing::info!(model = model_id, device = ?device, "Loading whisper model");

    let api = Api::new().map_err(|e| TranscriptionError::ModelLoadFailed(e.to_string()))?;
    let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

    let config_path = repo
        .get("config.json")
        .map_err(|e| TranscriptionError::ModelLoadFailed(format!("config.json: {}", e)))?;
    let tokenizer_path = repo
        .get("tokenizer.json")
        .map_err(|e| TranscriptionError::ModelLoadFailed(format!("tokenizer.json: {}", e)))?;
    let weights_path = repo
        .get("model.safetensors")
        .map_err(|e| TranscriptionError::ModelLoadFailed(format!("model.safetensors: {}", e)))?;
    let mel_path = api
        .repo(Repo::new(MEL_FILTERS_REPO.to_string(), RepoType::Model))
        .get("melfilters.bytes")
        .map_err(|e| TranscriptionError::ModelLoadFailed(format!("melfilters.bytes: {}", e)))?;

    let config: Config = serde_json::from_str(
        &std::fs::read_to_string(&config_path)
            .map_err(|e| TranscriptionError::ModelLoadFailed(format!("read config: {}", e)))?,
    )
    .map_err(|e| TranscriptionError::ModelLoadFailed(format!("parse config: {}", e)))?;

    let tokenizer = Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| TranscriptionError::ModelLoadFailed(format!("tokenizer: {}", e)))?;

    let mel_bytes = std::fs::read(&mel_path)
        .map_err(|e| TranscriptionError::ModelLoadFailed(format!("mel filters: {}", e)))?;
    let mel_filters = read_mel_filters(&mel_bytes, &config)?;

    // SAFETY: safetensors files are memory-mapped read-only
    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[weights_path], m::DTYPE, &device)
            .map_err(|e| TranscriptionError::ModelLoadFailed(format!("weights: {}", e)))?
    };
    let model = m::model::Whisper::load(&vb, config.clone())
        .map_err(|e| TranscriptionError::ModelLoadFailed(format!("model: {}", e)))?;

    tracing::info!(model = model_id, "Whisper model resident");
    Ok(LoadedModel {
        model: Mutex::new(model),
        tokenizer,
        config,
        device,
        mel_filters,
    })
}

/// Greedy decode of one 30-second window.
fn decode_window(
    model: &mut m::model::Whisper,
    tokenizer: &Tokenizer,
    device: &Device,
    mel: &Tensor,
    prompt: &[u32],
) -> Result<String, TranscriptionError> {
    let eot_token = token_id(tokenizer, m::EOT_TOKEN)?;

    let audio_features = model
        .encoder
        .forward(mel, true)
        .map_err(|e| TranscriptionError::TranscriptionFailed(format!("encoder: {}", e)))?;

    let mut tokens = prompt.to_vec();
    let mut text = String::new();

    for _ in 0..MAX_DECODE_TOKENS {
        let token_tensor = Tensor::new(tokens.as_slice(), device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(tensor_err)?;

        let flush_cache = tokens.len() == prompt.len();
        let decoder_output = model
            .decoder
            .forward(&token_tensor, &audio_features, flush_cache)
            .map_err(|e| TranscriptionError::TranscriptionFailed(format!("decoder: {}", e)))?;

        let logits = decoder_output
            .squeeze(0)
            .and_then(|t| model.decoder.final_linear(&t))
            .map_err(tensor_err)?;

        let next_token = logits
            .dim(0)
            .and_then(|seq_len| logits.get(seq_len - 1))
            .and_then(|last| last.argmax(0))
            .and_then(|t| t.to_scalar::<u32>())
            .map_err(tensor_err)?;

        if next_token == eot_token {
            break;
        }
        tokens.push(next_token);

        if let Some(piece) = tokenizer.id_to_token(next_token) {
            text.push_str(&piece.replace('Ġ', " ").replace('▁', " "));
        }
    }

    model.reset_kv_cache();
    Ok(text.trim().to_string())
}

fn token_id(tokenizer: &Tokenizer, token: &str) -> Result<u32, TranscriptionError> {
    tokenizer.token_to_id(token).ok_or_else(|| {
        TranscriptionError::TranscriptionFailed(format!("token not found: {}", token))
    })
}

fn read_mel_filters(bytes: &[u8], config: &Config) -> Result<Vec<f32>, TranscriptionError> {
    let expected_len = config.num_mel_bins * (m::N_FFT / 2 + 1);
    if bytes.len() < expected_len * 4 {
        return Err(TranscriptionError::ModelLoadFailed(format!(
            "mel filters file too small: {} bytes, expected at least {}",
            bytes.len(),
            expected_len * 4
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .take(expected_len)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

fn tensor_err(e: candle_core::Error) -> TranscriptionError {
    TranscriptionError::TranscriptionFailed(e.to_string())
}

// In-process ONNX Runtime generation
// One forward pass over the prompt, then greedy argmax over the output positions.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue};
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::locator::ExecutableLocator;
use super::output::is_gibberish;
use super::{InferenceRequest, ModelTier, TextGenerator};
use crate::config::{ModelProfile, TensorConfig};
use crate::error::{InferenceError, Result};

/// Inputs shorter than this trigger the budget rebalance
const MIN_INPUT_TOKENS: usize = 128;

/// Ceiling for the rebalanced input budget
const REBALANCED_INPUT_CAP: usize = 256;

const TOKENIZER_FILE: &str = "tokenizer.json";

fn runtime_error(e: impl std::fmt::Display) -> InferenceError {
    InferenceError::TensorRuntime(e.to_string())
}

// ============================================================================
// Token budget and decoding
// ============================================================================

/// Splits the context window into `(max_input, max_new)` token budgets.
///
/// When the requested generation would leave fewer than 128 input tokens the
/// input gets `min(256, context/2)` and generation gets the rest.
pub fn plan_token_budget(context_length: usize, max_new_tokens: usize) -> (usize, usize) {
    let max_new = max_new_tokens.min(context_length);
    let max_input = context_length - max_new;

    if max_input < MIN_INPUT_TOKENS {
        let max_input = REBALANCED_INPUT_CAP.min(context_length / 2);
        let max_new = context_length - max_input;
        log::warn!(
            "Adjusted max input tokens to {} and max new tokens to {}",
            max_input,
            max_new
        );
        return (max_input, max_new);
    }

    (max_input, max_new)
}

/// `(sequence_length, vocab_size)` from a `[.., seq, vocab]` logits shape
pub fn logits_dims(shape: &[i64]) -> Option<(usize, usize)> {
    if shape.len() < 2 {
        return None;
    }
    let vocab = usize::try_from(shape[shape.len() - 1]).ok()?;
    let seq = usize::try_from(shape[shape.len() - 2]).ok()?;
    if vocab == 0 {
        return None;
    }
    Some((seq, vocab))
}

/// Argmax per output position, stopping after the first end-of-sequence id
pub fn greedy_decode(
    logits: &[f32],
    seq_len: usize,
    vocab_size: usize,
    max_new_tokens: usize,
    eos_token_ids: &[u32],
) -> Vec<u32> {
    if vocab_size == 0 {
        return Vec::new();
    }
    let positions = seq_len.min(max_new_tokens).min(logits.len() / vocab_size);
    let mut tokens = Vec::with_capacity(positions);

    for row in logits.chunks_exact(vocab_size).take(positions) {
        let mut best = 0usize;
        let mut best_score = row[0];
        for (idx, &score) in row.iter().enumerate().skip(1) {
            if score > best_score {
                best = idx;
                best_score = score;
            }
        }

        let token = best as u32;
        tokens.push(token);
        if eos_token_ids.contains(&token) {
            break;
        }
    }

    tokens
}

// ============================================================================
// Session
// ============================================================================

/// Loaded ONNX session plus the tokenizer matching its vocabulary
pub struct TensorSession {
    // run() needs exclusive access
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    input_names: Vec<String>,
    model_path: PathBuf,
}

impl TensorSession {
    pub fn open(model_path: &Path, tokenizer_path: &Path, intra_threads: usize) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
            log::warn!("Failed to load tokenizer {}: {}", tokenizer_path.display(), e);
            InferenceError::TokenizerUnavailable
        })?;
        log::info!("Tokenizer loaded from {}", tokenizer_path.display());

        let session = Session::builder()
            .map_err(runtime_error)?
            .with_optimization_level(GraphOptimizationLevel::Level1)
            .map_err(runtime_error)?
            .with_intra_threads(intra_threads.max(1))
            .map_err(runtime_error)?
            .with_memory_pattern(true)
            .map_err(runtime_error)?
            .commit_from_file(model_path)
            .map_err(runtime_error)?;

        let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        log::info!(
            "ONNX session created for {} (inputs: {:?})",
            model_path.display(),
            input_names
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            input_names,
            model_path: model_path.to_path_buf(),
        })
    }

    /// Blocking: tokenize, one forward pass, greedy decode, detokenize
    pub fn generate_blocking(
        &self,
        prompt: &str,
        max_new_tokens: usize,
        profile: &ModelProfile,
    ) -> Result<String> {
        let encoding = self.tokenizer.encode(prompt, true).map_err(runtime_error)?;
        let mut ids: Vec<i64> = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();

        let (max_input, max_new) = plan_token_budget(profile.context_length, max_new_tokens);
        if ids.len() > max_input {
            log::debug!("Truncated input from {} to {} tokens", ids.len(), max_input);
            ids.truncate(max_input);
        }
        if ids.is_empty() {
            return Err(InferenceError::TensorRuntime("prompt produced no tokens".to_string()));
        }

        let len = ids.len();
        let input_ids = Array2::from_shape_vec((1, len), ids).map_err(runtime_error)?;
        let attention_mask = Array2::<i64>::ones((1, len));

        let mut inputs: Vec<(&str, SessionInputValue<'_>)> = vec![
            ("input_ids", Tensor::from_array(input_ids).map_err(runtime_error)?.into()),
            ("attention_mask", Tensor::from_array(attention_mask).map_err(runtime_error)?.into()),
        ];
        if self.input_names.iter().any(|n| n == "token_type_ids") {
            let token_type_ids = Array2::<i64>::zeros((1, len));
            inputs.push((
                "token_type_ids",
                Tensor::from_array(token_type_ids).map_err(runtime_error)?.into(),
            ));
        }

        let tokens = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| InferenceError::TensorRuntime("session lock poisoned".to_string()))?;
            let outputs = session.run(inputs).map_err(runtime_error)?;
            let (shape, logits) = outputs[0].try_extract_tensor::<f32>().map_err(runtime_error)?;
            let dims: Vec<i64> = shape.iter().copied().collect();
            let (seq_len, vocab) = logits_dims(&dims)
                .ok_or_else(|| InferenceError::TensorRuntime(format!("unexpected logits shape {:?}", dims)))?;
            greedy_decode(logits, seq_len, vocab, max_new, &profile.eos_token_ids)
        };

        self.tokenizer.decode(&tokens, true).map_err(runtime_error)
    }
}

impl Drop for TensorSession {
    fn drop(&mut self) {
        log::info!("Released ONNX session for {}", self.model_path.display());
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct TensorInferenceEngine {
    session: RwLock<Option<Arc<TensorSession>>>,
    profile: ModelProfile,
    model_path: PathBuf,
}

impl TensorInferenceEngine {
    /// Finds the first `.onnx` candidate and opens it with its tokenizer.
    pub fn load(config: &TensorConfig) -> Result<Self> {
        let model_path = ExecutableLocator::find_model_file(&config.model_candidates, "onnx")
            .ok_or(InferenceError::ModelFileNotFound)?;

        let tokenizer_path = match &config.tokenizer_path {
            Some(path) => path.clone(),
            None => model_path
                .parent()
                .map(|dir| dir.join(TOKENIZER_FILE))
                .unwrap_or_else(|| PathBuf::from(TOKENIZER_FILE)),
        };

        let started = Instant::now();
        let session = TensorSession::open(&model_path, &tokenizer_path, config.intra_threads)?;
        log::info!(
            "ONNX model {} loaded in {:.2}s",
            config.profile.name,
            started.elapsed().as_secs_f64()
        );

        Ok(Self {
            session: RwLock::new(Some(Arc::new(session))),
            profile: config.profile.clone(),
            model_path,
        })
    }

    fn current_session(&self) -> Option<Arc<TensorSession>> {
        self.session.read().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl TextGenerator for TensorInferenceEngine {
    fn tier(&self) -> ModelTier {
        ModelTier::TensorRuntime
    }

    fn is_ready(&self) -> bool {
        self.current_session().is_some()
    }

    fn model_name(&self) -> String {
        let file = self
            .model_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{} {} ({})", self.profile.name, file, ModelTier::TensorRuntime.label())
    }

    async fn generate(&self, request: &InferenceRequest) -> Result<String> {
        let session = self.current_session().ok_or(InferenceError::EngineNotLoaded)?;
        let prompt = request.prompt.clone();
        let max_new = request.max_new_tokens;
        let profile = self.profile.clone();

        let started = Instant::now();
        let text = tokio::task::spawn_blocking(move || {
            session.generate_blocking(&prompt, max_new, &profile)
        })
        .await
        .map_err(|e| InferenceError::TensorRuntime(format!("inference task failed: {}", e)))??;

        log::info!("ONNX generation took {:.2}s", started.elapsed().as_secs_f64());

        if is_gibberish(&text) {
            log::warn!("ONNX output is not readable text, discarding it");
            return Err(InferenceError::GibberishOutput);
        }
        Ok(text.trim().to_string())
    }

    fn close(&self) {
        let released = match self.session.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if released.is_some() {
            log::info!("ONNX engine closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_keeps_request_when_room_is_left() {
        assert_eq!(plan_token_budget(4096, 512), (3584, 512));
    }

    #[test]
    fn test_budget_rebalances_small_contexts() {
        assert_eq!(plan_token_budget(512, 512), (256, 256));
        assert_eq!(plan_token_budget(512, 400), (256, 256));
        assert_eq!(plan_token_budget(200, 100), (100, 100));
    }

    #[test]
    fn test_greedy_decode_stops_at_eos() {
        // 4 positions over a vocab of 3; position 2 picks id 2 (EOS)
        let logits = vec![
            0.1, 0.9, 0.0, //
            0.8, 0.1, 0.1, //
            0.0, 0.1, 0.9, //
            0.0, 0.9, 0.1,
        ];
        assert_eq!(greedy_decode(&logits, 4, 3, 10, &[2]), vec![1, 0, 2]);
    }

    #[test]
    fn test_greedy_decode_respects_budget() {
        let logits = vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        assert_eq!(greedy_decode(&logits, 3, 2, 2, &[]), vec![1, 1]);
    }

    #[test]
    fn test_logits_dims() {
        assert_eq!(logits_dims(&[1, 7, 30522]), Some((7, 30522)));
        assert_eq!(logits_dims(&[30522]), None);
        assert_eq!(logits_dims(&[1, 7, 0]), None);
    }

    #[test]
    fn test_load_without_model_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = TensorConfig {
            model_candidates: vec![dir.path().join("model.onnx")],
            ..TensorConfig::default()
        };
        assert!(matches!(
            TensorInferenceEngine::load(&config),
            Err(InferenceError::ModelFileNotFound)
        ));
    }

    #[test]
    fn test_load_without_tokenizer_fails() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.onnx");
        std::fs::write(&model, b"not really onnx").unwrap();
        let config = TensorConfig {
            model_candidates: vec![model],
            ..TensorConfig::default()
        };
        assert!(matches!(
            TensorInferenceEngine::load(&config),
            Err(InferenceError::TokenizerUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_closed_engine_is_not_loaded() {
        let engine = TensorInferenceEngine {
            session: RwLock::new(None),
            profile: ModelProfile::onnx_default(),
            model_path: PathBuf::from("model.onnx"),
        };
        engine.close();
        assert!(!engine.is_ready());
        let err = engine.generate(&InferenceRequest::new("hi", 4)).await.unwrap_err();
        assert!(matches!(err, InferenceError::EngineNotLoaded));
    }
}

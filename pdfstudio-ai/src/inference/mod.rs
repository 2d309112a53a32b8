//! Inference tiers and the types they share.
//!
//! Four mutually exclusive strategies produce text for the assistant:
//!
//! - `remote`: the sibling AI service over HTTP
//! - `process_engine`: a llama.cpp style CLI run as a child process
//! - `tensor_engine`: an in-process ONNX Runtime session with greedy decoding
//! - the stub tier, which lives in `assistant::stub` and needs no model at all
//!
//! `locator` finds engine binaries and weight files, `output` cleans and
//! screens whatever the engines print.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod locator;
pub mod output;
pub mod process_engine;
pub mod remote;
pub mod tensor_engine;

pub use locator::ExecutableLocator;
pub use process_engine::{EngineHandle, ProcessInferenceEngine};
pub use remote::{HealthState, RemoteInferenceClient};
pub use tensor_engine::{TensorInferenceEngine, TensorSession};

/// The inference strategy an orchestrator settled on at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelTier {
    Remote,
    SubprocessEngine,
    TensorRuntime,
    Stub,
}

impl ModelTier {
    /// Highest priority first
    pub const PRIORITY: [ModelTier; 4] = [
        ModelTier::Remote,
        ModelTier::SubprocessEngine,
        ModelTier::TensorRuntime,
        ModelTier::Stub,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ModelTier::Remote => "AI Microservice",
            ModelTier::SubprocessEngine => "Local GGUF (llama.cpp)",
            ModelTier::TensorRuntime => "Local ONNX",
            ModelTier::Stub => "Stub",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sampling parameters for text generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Temperature - controls randomness (0.0 = deterministic)
    pub temperature: f32,

    /// Top-K sampling - limits vocabulary to top K tokens (0 = disabled)
    pub top_k: i32,

    /// Top-P (nucleus) sampling - cumulative probability threshold (1.0 = disabled)
    pub top_p: f32,

    /// Penalty applied to recently generated tokens (1.0 = disabled)
    pub repeat_penalty: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.9,
            repeat_penalty: 1.1,
        }
    }
}

/// One single-shot generation
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub prompt: String,
    /// Always greater than zero
    pub max_new_tokens: usize,
    pub sampling: SamplingParams,
}

impl InferenceRequest {
    /// A zero token budget is bumped to one.
    pub fn new(prompt: impl Into<String>, max_new_tokens: usize) -> Self {
        Self {
            prompt: prompt.into(),
            max_new_tokens: max_new_tokens.max(1),
            sampling: SamplingParams::default(),
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }
}

/// What a tier produced for one request
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult {
    pub text: String,
    pub tier: ModelTier,
    pub succeeded: bool,
}

impl InferenceResult {
    pub fn success(text: String, tier: ModelTier) -> Self {
        Self { text, tier, succeeded: true }
    }

    pub fn failure(tier: ModelTier) -> Self {
        Self { text: String::new(), tier, succeeded: false }
    }
}

/// A local tier that turns a prompt into text
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Which tier this generator implements
    fn tier(&self) -> ModelTier;

    /// Loaded and able to take requests
    fn is_ready(&self) -> bool;

    /// Short human readable model description
    fn model_name(&self) -> String;

    async fn generate(&self, request: &InferenceRequest) -> Result<String>;

    /// Release loaded resources; later calls may fail with `EngineNotLoaded`
    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_never_has_zero_budget() {
        let request = InferenceRequest::new("", 0);
        assert_eq!(request.max_new_tokens, 1);
        assert!(request.prompt.is_empty());
    }

    #[test]
    fn test_priority_order() {
        assert_eq!(ModelTier::PRIORITY[0], ModelTier::Remote);
        assert_eq!(ModelTier::PRIORITY[3], ModelTier::Stub);
    }

    #[test]
    fn test_sampling_deserializes_partially() {
        let sampling: SamplingParams = serde_json::from_str(r#"{"temperature": 0.2}"#).unwrap();
        assert_eq!(sampling.temperature, 0.2);
        assert_eq!(sampling.top_k, 40);
        assert_eq!(sampling.repeat_penalty, 1.1);
    }
}

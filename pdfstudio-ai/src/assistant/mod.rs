//! Document-level AI operations on top of the inference tiers.
//!
//! [`InferenceOrchestrator`] picks a tier once and answers every operation
//! with model output when it is usable and with [`StubResponseGenerator`]
//! output when it is not.

use serde::Serialize;

pub mod orchestrator;
pub mod prompts;
pub mod stub;

pub use orchestrator::{select_tier, Backends, InferenceOrchestrator};
pub use stub::StubResponseGenerator;

/// Text already extracted from a PDF, with the name shown to the user
#[derive(Debug, Clone)]
pub struct DocumentContext {
    pub title: String,
    pub text: String,
}

impl DocumentContext {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
        }
    }
}

/// Insight text with how much it can be trusted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiResponse {
    pub text: String,
    /// 0.85 for model output, 0.35 for the stub analysis
    pub confidence: f32,
    pub processing_time_ms: u64,
    pub model_used: String,
}

//! Text generation for the PDF Studio AI assistant.
//!
//! Generation runs on the best tier available at startup: a remote AI
//! service, a local llama.cpp CLI with a GGUF model, an in-process ONNX model,
//! or a deterministic stub that needs no model at all. Every operation on
//! [`InferenceOrchestrator`] produces an answer whichever tier is active.

pub mod assistant;
pub mod config;
pub mod error;
pub mod inference;

pub use assistant::{AiResponse, Backends, DocumentContext, InferenceOrchestrator, StubResponseGenerator};
pub use config::AiConfig;
pub use error::{InferenceError, Result};
pub use inference::{InferenceRequest, InferenceResult, ModelTier, SamplingParams, TextGenerator};

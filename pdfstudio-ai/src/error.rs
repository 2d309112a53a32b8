// Error taxonomy shared by every inference tier

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference engine executable not found")]
    ExecutableNotFound,

    #[error("model weight file not found")]
    ModelFileNotFound,

    #[error("engine not loaded")]
    EngineNotLoaded,

    #[error("failed to spawn inference engine: {0}")]
    ProcessSpawnFailure(String),

    #[error("inference engine exited with code {0}")]
    ProcessExitFailure(i32),

    #[error("inference engine did not finish within {0}s")]
    ProcessTimedOut(u64),

    #[error("inference engine produced no output")]
    EmptyOutput,

    #[error("tokenizer unavailable")]
    TokenizerUnavailable,

    #[error("tensor runtime error: {0}")]
    TensorRuntime(String),

    #[error("model output is not readable text")]
    GibberishOutput,

    #[error("cannot connect to AI service: {0}")]
    RemoteConnectFailure(String),

    #[error("AI service request timed out")]
    RemoteTimeout,

    #[error("AI service returned HTTP {status}: {body}")]
    RemoteServerError { status: u16, body: String },

    #[error("failed to parse AI service response: {0}")]
    RemoteProtocol(String),

    #[error("prompt file I/O failed: {0}")]
    TempFileIOFailure(#[source] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl InferenceError {
    /// Maps a reqwest failure onto the three remote failure shapes.
    pub fn from_reqwest(err: reqwest::Error, base_url: &str) -> Self {
        if err.is_timeout() {
            InferenceError::RemoteTimeout
        } else if err.is_connect() {
            InferenceError::RemoteConnectFailure(format!(
                "cannot connect to {}. Please check if the AI service is running.",
                base_url
            ))
        } else if err.is_decode() {
            InferenceError::RemoteProtocol(err.to_string())
        } else if let Some(status) = err.status() {
            InferenceError::RemoteServerError {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            InferenceError::RemoteConnectFailure(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, InferenceError>;

// Configuration for the AI core
// Explicitly constructed and handed to the orchestrator; nothing here is global.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, Result};
use crate::inference::SamplingParams;

// ============================================================================
// Defaults
// ============================================================================

/// Base URL of the sibling AI service
pub const DEFAULT_AI_SERVICE_URL: &str = "http://localhost:8081/api/ai";

/// Default new-token budget for a single generation
pub const DEFAULT_MAX_NEW_TOKENS: usize = 512;

/// Subprocess generation deadline (seconds) - can be overridden via PDFSTUDIO_GENERATION_TIMEOUT
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 300;

/// End-of-sequence ids recognised by the greedy decoder (BERT [SEP], </s>, GPT-2 <|endoftext|>)
pub const DEFAULT_EOS_TOKEN_IDS: [u32; 3] = [102, 2, 50256];

/// Engine diagnostics that never belong in generated text
pub const DEFAULT_LOG_MARKERS: &[&str] = &[
    "llama_model_load",
    "llm_load_",
    "llama_new_context",
    "system_info:",
    "load_backend",
    "error:",
    "ggml_",
    "sampling:",
    "llama_perf_",
    "llama_print_timings",
];

// ============================================================================
// Model Profiles
// ============================================================================

/// Declared capabilities of a model file
///
/// Supplied by configuration instead of being guessed from the file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Display name used in logs and in the status line
    pub name: String,

    /// Context window in tokens (prompt + generated)
    pub context_length: usize,

    /// Token ids that stop greedy decoding
    #[serde(default = "default_eos_ids")]
    pub eos_token_ids: Vec<u32>,
}

fn default_eos_ids() -> Vec<u32> {
    DEFAULT_EOS_TOKEN_IDS.to_vec()
}

impl ModelProfile {
    pub fn gguf_default() -> Self {
        Self {
            name: "Generic GGUF".to_string(),
            context_length: 4096,
            eos_token_ids: default_eos_ids(),
        }
    }

    pub fn onnx_default() -> Self {
        Self {
            name: "Generic ONNX".to_string(),
            context_length: 512,
            eos_token_ids: default_eos_ids(),
        }
    }
}

// ============================================================================
// Sub-configurations
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub health_timeout_secs: u64,
    pub health_attempts: u32,
    pub health_retry_delay_ms: u64,
    /// `maxLength` sent with summarize requests
    pub summary_max_length: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: DEFAULT_AI_SERVICE_URL.to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 60,
            health_timeout_secs: 5,
            health_attempts: 3,
            health_retry_delay_ms: 1000,
            summary_max_length: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubprocessConfig {
    /// Ordered engine binary candidates; first usable one wins
    pub executable_candidates: Vec<PathBuf>,
    /// Ordered weight file (or directory) candidates
    pub model_candidates: Vec<PathBuf>,
    /// Expected weight file extension
    pub model_extension: String,
    /// Arguments placed before the standard ones (wrapper scripts, launchers)
    pub leading_args: Vec<String>,
    /// Appended after the standard arguments
    pub extra_args: Vec<String>,
    /// Substrings marking engine log lines
    pub log_markers: Vec<String>,
    /// Where prompt files are written; system temp dir when unset
    pub prompt_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    pub sampling: SamplingParams,
    /// `context_length` is passed to the engine as `-c`
    pub profile: ModelProfile,
}

impl Default for SubprocessConfig {
    fn default() -> Self {
        Self {
            executable_candidates: default_executable_candidates(),
            model_candidates: default_gguf_candidates(),
            model_extension: "gguf".to_string(),
            leading_args: Vec::new(),
            extra_args: Vec::new(),
            log_markers: DEFAULT_LOG_MARKERS.iter().map(|m| m.to_string()).collect(),
            prompt_dir: None,
            timeout_secs: DEFAULT_GENERATION_TIMEOUT_SECS,
            sampling: SamplingParams::default(),
            profile: ModelProfile::gguf_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TensorConfig {
    pub enabled: bool,
    pub model_candidates: Vec<PathBuf>,
    /// Defaults to `tokenizer.json` next to the located model
    pub tokenizer_path: Option<PathBuf>,
    pub intra_threads: usize,
    pub profile: ModelProfile,
}

impl Default for TensorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_candidates: default_onnx_candidates(),
            tokenizer_path: None,
            intra_threads: 4,
            profile: ModelProfile::onnx_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
    pub max_concurrent_generations: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            max_concurrent_generations: 2,
        }
    }
}

/// Character budgets for the document excerpt embedded in each prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptBudgets {
    pub summary_chars: usize,
    pub chat_chars: usize,
    pub analysis_chars: usize,
    pub translation_chars: usize,
}

impl Default for PromptBudgets {
    fn default() -> Self {
        Self {
            summary_chars: 4000,
            chat_chars: 3000,
            analysis_chars: 3000,
            translation_chars: 2000,
        }
    }
}

// ============================================================================
// AiConfig
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub remote: RemoteConfig,
    pub subprocess: SubprocessConfig,
    pub tensor: TensorConfig,
    pub generation: GenerationConfig,
    pub prompts: PromptBudgets,
}

impl AiConfig {
    /// Configuration with every model tier switched off; the orchestrator settles on the stub tier.
    pub fn offline() -> Self {
        let mut config = Self::default();
        config.remote.enabled = false;
        config.subprocess.executable_candidates.clear();
        config.subprocess.model_candidates.clear();
        config.tensor.enabled = false;
        config
    }

    /// Read a JSON configuration file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            InferenceError::InvalidConfiguration(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            InferenceError::InvalidConfiguration(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    /// File (or defaults) plus environment overrides, validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in `load`).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("PDFSTUDIO_AI_SERVICE_URL") {
            log::info!("Using AI service URL from PDFSTUDIO_AI_SERVICE_URL: {}", url);
            self.remote.base_url = url;
        }
        if let Some(flag) = non_empty("PDFSTUDIO_AI_REMOTE_DISABLED") {
            if matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes") {
                self.remote.enabled = false;
            }
        }
        if let Some(exe) = non_empty("PDFSTUDIO_LLAMA_CLI") {
            self.subprocess.executable_candidates.insert(0, PathBuf::from(exe));
        }
        if let Some(model) = non_empty("PDFSTUDIO_GGUF_MODEL") {
            self.subprocess.model_candidates.insert(0, PathBuf::from(model));
        }
        if let Some(model) = non_empty("PDFSTUDIO_ONNX_MODEL") {
            self.tensor.model_candidates.insert(0, PathBuf::from(model));
        }
        if let Some(secs) = non_empty("PDFSTUDIO_GENERATION_TIMEOUT").and_then(|s| s.parse().ok()) {
            self.subprocess.timeout_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(InferenceError::InvalidConfiguration(msg.to_string()));

        if self.generation.max_new_tokens == 0 {
            return invalid("generation.max_new_tokens must be greater than zero");
        }
        if self.generation.max_concurrent_generations == 0 {
            return invalid("generation.max_concurrent_generations must be at least 1");
        }
        if self.subprocess.profile.context_length == 0 || self.tensor.profile.context_length == 0 {
            return invalid("model profile context_length must be greater than zero");
        }
        if self.subprocess.timeout_secs == 0 {
            return invalid("subprocess.timeout_secs must be greater than zero");
        }
        if self.remote.enabled {
            let url = self.remote.base_url.as_str();
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return invalid("remote.base_url must start with http:// or https://");
            }
            if self.remote.health_attempts == 0 {
                return invalid("remote.health_attempts must be at least 1");
            }
        }
        let budgets = &self.prompts;
        if budgets.summary_chars == 0
            || budgets.chat_chars == 0
            || budgets.analysis_chars == 0
            || budgets.translation_chars == 0
        {
            return invalid("prompt budgets must be greater than zero");
        }
        Ok(())
    }
}

// ============================================================================
// Default candidate paths
// ============================================================================

fn user_models_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".pdfstudio").join("models"))
}

fn default_executable_candidates() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = [
        "llama.cpp/build/bin/Release/llama-cli.exe",
        "llama.cpp/build/bin/llama-cli.exe",
        "llama.cpp/build/bin/llama-cli",
        "llama.cpp/llama-cli.exe",
        "llama.cpp/llama-cli",
        "../llama.cpp/llama-cli",
        "llama-cli.exe",
        "llama-cli",
        "C:/llama.cpp/build/bin/Release/llama-cli.exe",
        "C:/llama.cpp/llama-cli.exe",
        "/usr/local/bin/llama-cli",
        "/opt/llama.cpp/llama-cli",
        "llama.cpp/build/bin/Release/main.exe",
        "llama.cpp/build/bin/main",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();

    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".pdfstudio").join("bin").join("llama-cli"));
    }
    candidates
}

fn default_gguf_candidates() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = [
        "models/Llama-3.2-3B-Instruct-Q6_K_L_2.gguf",
        "models/phi-3-mini-4k-instruct-q4.gguf",
        "Models/Llama-3.2-3B-Instruct-Q6_K_L_2.gguf",
        "Models/phi-3-mini-4k-instruct-q4.gguf",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();

    if let Some(dir) = user_models_dir() {
        candidates.push(dir);
    }
    candidates
}

fn default_onnx_candidates() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = [
        "models/model.onnx",
        "models/llama/model.onnx",
        "models/phi3/model.onnx",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();

    if let Some(dir) = user_models_dir() {
        candidates.push(dir.join("model.onnx"));
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = AiConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.remote.base_url, DEFAULT_AI_SERVICE_URL);
        assert_eq!(config.prompts.summary_chars, 4000);
        assert_eq!(config.subprocess.sampling.top_k, 40);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{"remote": {"base_url": "http://10.0.0.5:9000/api/ai"}, "generation": {"max_new_tokens": 128}}"#;
        let config: AiConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.remote.base_url, "http://10.0.0.5:9000/api/ai");
        assert_eq!(config.remote.health_attempts, 3);
        assert_eq!(config.generation.max_new_tokens, 128);
        assert_eq!(config.tensor.profile.context_length, 512);
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ai.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = AiConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, InferenceError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_overrides_prepend_candidates() {
        let env: HashMap<&str, &str> = [
            ("PDFSTUDIO_LLAMA_CLI", "/custom/llama-cli"),
            ("PDFSTUDIO_GENERATION_TIMEOUT", "42"),
            ("PDFSTUDIO_AI_REMOTE_DISABLED", "true"),
            ("PDFSTUDIO_AI_SERVICE_URL", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = AiConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(
            config.subprocess.executable_candidates[0],
            PathBuf::from("/custom/llama-cli")
        );
        assert_eq!(config.subprocess.timeout_secs, 42);
        assert!(!config.remote.enabled);
        assert_eq!(config.remote.base_url, DEFAULT_AI_SERVICE_URL);
    }

    #[test]
    fn test_validate_rejects_zero_tokens() {
        let mut config = AiConfig::default();
        config.generation.max_new_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_url_only_when_remote_enabled() {
        let mut config = AiConfig::default();
        config.remote.base_url = "not-a-url".to_string();
        assert!(config.validate().is_err());

        config.remote.enabled = false;
        assert!(config.validate().is_ok());
    }
}

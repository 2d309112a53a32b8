// Tier selection and per-operation fallback
//
// The tier is fixed at construction. Each operation tries the model path for
// that tier and substitutes a stub response whenever the model path fails or
// returns something unusable; nothing from an engine reaches the caller as an error.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{OnceCell, Semaphore};

use super::prompts::{self, DEFAULT_CHAT_QUESTION};
use super::stub::StubResponseGenerator;
use super::{AiResponse, DocumentContext};
use crate::config::AiConfig;
use crate::error::Result;
use crate::inference::output::{clean_model_output, is_gibberish, is_placeholder, split_list_output};
use crate::inference::{
    InferenceRequest, InferenceResult, ModelTier, ProcessInferenceEngine, RemoteInferenceClient,
    TensorInferenceEngine, TextGenerator,
};

const MODEL_CONFIDENCE: f32 = 0.85;
const STUB_CONFIDENCE: f32 = 0.35;

type SharedGenerator = Arc<dyn TextGenerator>;

/// Pre-built tiers for [`InferenceOrchestrator::with_backends`]
#[derive(Default)]
pub struct Backends {
    /// Treated as reachable; no health probe is made
    pub remote: Option<RemoteInferenceClient>,
    pub process: Option<SharedGenerator>,
    pub tensor: Option<SharedGenerator>,
}

/// Highest-priority available tier: Remote > SubprocessEngine > TensorRuntime > Stub
pub fn select_tier(remote_available: bool, process_ready: bool, tensor_ready: bool) -> ModelTier {
    if remote_available {
        ModelTier::Remote
    } else if process_ready {
        ModelTier::SubprocessEngine
    } else if tensor_ready {
        ModelTier::TensorRuntime
    } else {
        ModelTier::Stub
    }
}

/// Resolve the best local generator: CLI engine first, then the ONNX model
async fn load_local(config: &AiConfig) -> Option<SharedGenerator> {
    match ProcessInferenceEngine::locate(&config.subprocess) {
        Ok(engine) => return Some(Arc::new(engine)),
        Err(e) => log::info!("GGUF model not usable ({}), trying ONNX model...", e),
    }

    if !config.tensor.enabled {
        log::info!("ONNX tier disabled by configuration");
        return None;
    }

    let tensor_config = config.tensor.clone();
    match tokio::task::spawn_blocking(move || TensorInferenceEngine::load(&tensor_config)).await {
        Ok(Ok(engine)) => Some(Arc::new(engine)),
        Ok(Err(e)) => {
            log::info!("ONNX model not usable: {}", e);
            None
        }
        Err(e) => {
            log::error!("ONNX load task failed: {}", e);
            None
        }
    }
}

/// Model output is usable unless it is empty, error-shaped, or (tensor tier only) gibberish
fn accept(raw: &str, tier: ModelTier) -> Option<String> {
    let text = clean_model_output(raw);
    if text.is_empty() {
        log::warn!("{} returned empty output, using stub response", tier);
        return None;
    }
    if is_placeholder(&text) {
        log::warn!("{} returned a placeholder response, using stub response", tier);
        return None;
    }
    if tier == ModelTier::TensorRuntime && is_gibberish(&text) {
        log::warn!("{} output appears to be gibberish, using stub response", tier);
        return None;
    }
    Some(text)
}

pub struct InferenceOrchestrator {
    config: AiConfig,
    tier: ModelTier,
    remote: Option<RemoteInferenceClient>,
    /// Active local generator; under the Remote tier it is resolved on first use
    local: OnceCell<Option<SharedGenerator>>,
    permits: Semaphore,
}

impl InferenceOrchestrator {
    /// Validate the configuration, then probe tiers in priority order.
    ///
    /// Only configuration errors are returned; an unavailable tier just moves
    /// selection on to the next one.
    pub async fn new(config: AiConfig) -> Result<Self> {
        config.validate()?;

        if config.remote.enabled {
            log::info!("Checking AI service availability...");
            let client = RemoteInferenceClient::new(&config.remote)?;
            if client.is_available().await {
                log::info!("✅ AI tier selected: {}", ModelTier::Remote);
                return Ok(Self::assemble(config, ModelTier::Remote, Some(client), OnceCell::new()));
            }
            log::info!("AI service not available, trying local GGUF model...");
        } else {
            log::info!("AI service disabled by configuration");
        }

        let local = load_local(&config).await;
        let tier = local.as_ref().map_or(ModelTier::Stub, |engine| engine.tier());
        if tier == ModelTier::Stub {
            log::warn!("⚠️ No model available, AI features will use stub responses");
        } else {
            log::info!("✅ AI tier selected: {}", tier);
        }

        Ok(Self::assemble(config, tier, None, OnceCell::new_with(Some(local))))
    }

    /// Build from already-constructed tiers.
    pub fn with_backends(config: AiConfig, backends: Backends) -> Result<Self> {
        config.validate()?;

        let process_ready = backends.process.as_ref().map_or(false, |g| g.is_ready());
        let tensor_ready = backends.tensor.as_ref().map_or(false, |g| g.is_ready());
        let tier = select_tier(backends.remote.is_some(), process_ready, tensor_ready);

        let local = if process_ready {
            backends.process
        } else if tensor_ready {
            backends.tensor
        } else {
            None
        };

        log::info!("AI tier selected: {}", tier);
        Ok(Self::assemble(config, tier, backends.remote, OnceCell::new_with(Some(local))))
    }

    fn assemble(
        config: AiConfig,
        tier: ModelTier,
        remote: Option<RemoteInferenceClient>,
        local: OnceCell<Option<SharedGenerator>>,
    ) -> Self {
        let permits = Semaphore::new(config.generation.max_concurrent_generations);
        Self {
            config,
            tier,
            remote,
            local,
            permits,
        }
    }

    // ========================================================================
    // Status
    // ========================================================================

    pub fn tier(&self) -> ModelTier {
        self.tier
    }

    pub fn model_name(&self) -> String {
        match (self.tier, &self.remote) {
            (ModelTier::Remote, Some(remote)) => {
                format!("{} ({})", ModelTier::Remote.label(), remote.base_url())
            }
            (ModelTier::Stub, _) => ModelTier::Stub.label().to_string(),
            _ => self
                .local_model_name()
                .unwrap_or_else(|| self.tier.label().to_string()),
        }
    }

    /// One-line status for display
    pub fn describe(&self) -> String {
        format!("AI tier: {} | model: {}", self.tier, self.model_name())
    }

    fn local_model_name(&self) -> Option<String> {
        self.local
            .get()
            .and_then(|engine| engine.as_ref())
            .map(|engine| engine.model_name())
    }

    /// Releases the local engine. Safe to call more than once.
    pub fn close(&self) {
        if let Some(Some(engine)) = self.local.get() {
            engine.close();
        }
        log::info!("AI orchestrator closed");
    }

    // ========================================================================
    // Generation
    // ========================================================================

    async fn local_engine(&self) -> Option<SharedGenerator> {
        self.local
            .get_or_init(|| async {
                log::info!("Resolving local model for AI service fallback");
                load_local(&self.config).await
            })
            .await
            .clone()
    }

    fn request(&self, prompt: String) -> InferenceRequest {
        InferenceRequest::new(prompt, self.config.generation.max_new_tokens)
            .with_sampling(self.config.subprocess.sampling.clone())
    }

    /// One generation on the local tier, screened for usable output.
    ///
    /// Under the Remote tier this uses the local fallback engine.
    pub async fn generate(&self, request: &InferenceRequest) -> InferenceResult {
        let Some(engine) = self.local_engine().await else {
            return InferenceResult::failure(ModelTier::Stub);
        };
        let tier = engine.tier();

        let Ok(_permit) = self.permits.acquire().await else {
            return InferenceResult::failure(tier);
        };

        let started = Instant::now();
        match engine.generate(request).await {
            Ok(raw) => match accept(&raw, tier) {
                Some(text) => {
                    log::info!("{} generation took {} ms", tier, started.elapsed().as_millis());
                    InferenceResult::success(text, tier)
                }
                None => InferenceResult::failure(tier),
            },
            Err(e) => {
                log::warn!("{} generation failed, using stub response: {}", tier, e);
                InferenceResult::failure(tier)
            }
        }
    }

    async fn run_local(&self, prompt: String) -> Option<String> {
        let result = self.generate(&self.request(prompt)).await;
        result.succeeded.then_some(result.text)
    }

    // ========================================================================
    // Operations
    // ========================================================================

    pub async fn summarize(&self, document: &DocumentContext) -> String {
        log::info!("Generating summary for document: {}", document.title);
        let started = Instant::now();
        let budget = self.config.prompts.summary_chars;

        if let Some(remote) = &self.remote {
            let excerpt = prompts::truncate_text(&document.text, budget);
            let outcome = {
                let _permit = self.permits.acquire().await;
                remote
                    .summarize(&excerpt, &document.title, self.config.remote.summary_max_length)
                    .await
            };
            match outcome {
                Ok(response) => {
                    if let Some(summary) = accept(&response.summary, ModelTier::Remote) {
                        log::info!(
                            "Summary received from AI service in {} ms (cached: {})",
                            started.elapsed().as_millis(),
                            response.cached
                        );
                        return summary;
                    }
                }
                Err(e) => log::error!("AI service failed, falling back to local model: {}", e),
            }
        }

        let summary = match self.run_local(prompts::summarize_prompt(&document.text, budget)).await {
            Some(summary) => summary,
            None => StubResponseGenerator::summary(&document.text),
        };
        log::info!("Summary generated in {} ms", started.elapsed().as_millis());
        summary
    }

    /// Blank messages are replaced by a default question.
    pub async fn chat(&self, document: &DocumentContext, message: &str) -> String {
        let message = match message.trim() {
            "" => DEFAULT_CHAT_QUESTION,
            trimmed => trimmed,
        };
        log::info!("Processing chat message: {}", message);
        let budget = self.config.prompts.chat_chars;

        if let Some(remote) = &self.remote {
            let context = prompts::truncate_text(&document.text, budget);
            let outcome = {
                let _permit = self.permits.acquire().await;
                remote.chat(message, &context, None).await
            };
            match outcome {
                Ok(reply) => {
                    if let Some(text) = accept(&reply.response, ModelTier::Remote) {
                        return text;
                    }
                }
                Err(e) => log::error!("AI service chat failed, falling back to local model: {}", e),
            }
        }

        match self.run_local(prompts::chat_prompt(&document.text, message, budget)).await {
            Some(reply) => reply,
            None => StubResponseGenerator::chat(message),
        }
    }

    pub async fn extract_entities(&self, document: &DocumentContext) -> Vec<String> {
        log::info!("Extracting entities from document");
        let prompt = prompts::entities_prompt(&document.text, self.config.prompts.analysis_chars);

        match self.run_local(prompt).await.map(|text| split_list_output(&text)) {
            Some(items) if !items.is_empty() => items,
            _ => StubResponseGenerator::entities(&document.text),
        }
    }

    pub async fn translate(&self, text: &str, target_language: &str) -> String {
        log::info!("Translating text to {}", target_language);
        let prompt =
            prompts::translate_prompt(text, target_language, self.config.prompts.translation_chars);

        match self.run_local(prompt).await {
            Some(translated) => translated,
            None => StubResponseGenerator::translation(text, target_language),
        }
    }

    pub async fn generate_insights(&self, document: &DocumentContext) -> AiResponse {
        log::info!("Generating insights for document");
        let started = Instant::now();
        let prompt = prompts::insights_prompt(&document.text, self.config.prompts.analysis_chars);

        let (text, confidence, model_used) = match self.run_local(prompt).await {
            Some(text) => (
                text,
                MODEL_CONFIDENCE,
                self.local_model_name()
                    .unwrap_or_else(|| self.tier.label().to_string()),
            ),
            None => (
                StubResponseGenerator::insights(&document.text),
                STUB_CONFIDENCE,
                ModelTier::Stub.label().to_string(),
            ),
        };

        AiResponse {
            text,
            confidence,
            processing_time_ms: started.elapsed().as_millis() as u64,
            model_used,
        }
    }

    pub async fn detect_sensitive_content(&self, document: &DocumentContext) -> Vec<String> {
        log::info!("Detecting sensitive content");
        let prompt = prompts::sensitive_prompt(&document.text, self.config.prompts.analysis_chars);

        match self.run_local(prompt).await.map(|text| split_list_output(&text)) {
            Some(items) if !items.is_empty() => items,
            _ => StubResponseGenerator::sensitive(&document.text),
        }
    }

    /// Text-layout heuristic; no model involved
    pub fn extract_tables(&self, document: &DocumentContext) -> Vec<String> {
        log::info!("Extracting tables from document");
        StubResponseGenerator::tables(&document.text)
    }

    /// Heading heuristic; no model involved
    pub fn detect_structure(&self, document: &DocumentContext) -> Vec<String> {
        log::info!("Detecting document structure");
        StubResponseGenerator::structure(&document.text)
    }
}

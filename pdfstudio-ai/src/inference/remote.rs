// HTTP client for the sibling AI service
// Summarize and chat are delegated over JSON; /health decides whether the remote tier is used.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RemoteConfig;
use crate::error::{InferenceError, Result};

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest<'a> {
    pub content: &'a str,
    pub filename: &'a str,
    pub max_length: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub summary: String,
    #[serde(default)]
    pub processing_time_ms: u64,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub model_used: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest<'a> {
    pub message: &'a str,
    pub context: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub response: String,
    #[serde(default)]
    pub processing_time_ms: u64,
    #[serde(default)]
    pub cached: bool,
}

/// Outcome of a liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Ready,
    Unavailable { attempts: u32 },
    Cancelled,
}

impl HealthState {
    pub fn is_ready(&self) -> bool {
        matches!(self, HealthState::Ready)
    }
}

// ============================================================================
// Client
// ============================================================================

pub struct RemoteInferenceClient {
    client: Client,
    base_url: String,
    request_timeout: Duration,
    health_timeout: Duration,
    health_attempts: u32,
    health_retry_delay: Duration,
}

impl RemoteInferenceClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| InferenceError::InvalidConfiguration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            health_timeout: Duration::from_secs(config.health_timeout_secs),
            health_attempts: config.health_attempts.max(1),
            health_retry_delay: Duration::from_millis(config.health_retry_delay_ms),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST {base}/summarize`
    pub async fn summarize(
        &self,
        content: &str,
        filename: &str,
        max_length: u32,
    ) -> Result<SummaryResponse> {
        info!("Requesting summary of '{}' from AI service", filename);
        let body = SummaryRequest {
            content,
            filename,
            max_length,
        };
        let response: SummaryResponse = self.post_json("summarize", &body).await?;
        info!(
            "AI service summary received ({} ms, cached: {})",
            response.processing_time_ms, response.cached
        );
        Ok(response)
    }

    /// `POST {base}/chat`
    pub async fn chat(
        &self,
        message: &str,
        context: &str,
        conversation_id: Option<&str>,
    ) -> Result<ChatResponse> {
        let body = ChatRequest {
            message,
            context,
            conversation_id,
        };
        let response: ChatResponse = self.post_json("chat", &body).await?;
        info!("AI service chat reply received ({} ms)", response.processing_time_ms);
        Ok(response)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| InferenceError::from_reqwest(e, &self.base_url))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!("AI service returned {} for {}", status, url);
            return Err(InferenceError::RemoteServerError {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| InferenceError::RemoteProtocol(e.to_string()))
    }

    async fn check_health_once(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| InferenceError::from_reqwest(e, &self.base_url))?;

        // Only a plain 200 counts as ready
        if response.status() == StatusCode::OK {
            Ok(())
        } else {
            Err(InferenceError::RemoteServerError {
                status: response.status().as_u16(),
                body: String::new(),
            })
        }
    }

    /// Bounded liveness probe.
    ///
    /// Returns on the first healthy response. Between attempts it sleeps for
    /// the retry delay; cancellation during a request or a sleep ends the
    /// probe with `Cancelled`.
    pub async fn probe_health(&self, cancel: &CancellationToken) -> HealthState {
        for attempt in 1..=self.health_attempts {
            let outcome = tokio::select! {
                result = self.check_health_once() => result,
                _ = cancel.cancelled() => {
                    info!("AI service health check cancelled");
                    return HealthState::Cancelled;
                }
            };

            match outcome {
                Ok(()) => {
                    info!("AI service is healthy at {} (attempt {})", self.base_url, attempt);
                    return HealthState::Ready;
                }
                Err(e) => {
                    debug!(
                        "AI service health check {}/{} failed: {}",
                        attempt, self.health_attempts, e
                    );
                }
            }

            if attempt < self.health_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.health_retry_delay) => {}
                    _ = cancel.cancelled() => {
                        info!("AI service health check cancelled between attempts");
                        return HealthState::Cancelled;
                    }
                }
            }
        }

        warn!(
            "AI service not available at {} after {} attempts",
            self.base_url, self.health_attempts
        );
        HealthState::Unavailable {
            attempts: self.health_attempts,
        }
    }

    pub async fn is_available(&self) -> bool {
        self.probe_health(&CancellationToken::new()).await.is_ready()
    }

    pub async fn is_available_with_cancel(&self, cancel: &CancellationToken) -> bool {
        self.probe_health(cancel).await.is_ready()
    }
}

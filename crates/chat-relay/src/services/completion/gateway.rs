use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::LlmConfig;
use crate::models::chat::{ChatMessage, ImageAttachment};

use super::error::{CompletionError, FailureKind};
use super::fallback::FallbackTable;
use super::payload::{assemble_messages, ChatCompletionRequest, RequestMessage};

const IMAGE_SYSTEM_PROMPT: &str = "You are a sarcastic image analyst. Analyze images with humor \
and irony. Give not only a description but also witty comments. Be sharp, but never cruel.";

/// Outcome of a single unretried call to the completion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointHealth {
    Ready,
    Slow,
    Unavailable,
}

#[derive(Debug, Clone, Copy)]
pub struct EndpointCheck {
    pub health: EndpointHealth,
    pub elapsed: Duration,
}

/// Remote completion boundary. One call = one attempt; retries live in
/// the gateway.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &ChatCompletionRequest) -> Result<String, CompletionError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub model: String,
    /// Model used for image requests
    pub vision_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub retry_attempts: u32,
    pub max_context_messages: usize,
    pub attempt_timeout: Duration,
    pub backoff_base: Duration,
}

impl GatewayConfig {
    pub fn from_llm(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            vision_model: config.vision_model.clone().unwrap_or_else(|| config.model.clone()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry_attempts: config.retry_attempts,
            max_context_messages: config.max_context_messages,
            attempt_timeout: config.timeout(),
            backoff_base: config.backoff_base(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            model: "openai/gpt-oss-20b:free".to_string(),
            vision_model: "openai/gpt-oss-20b:free".to_string(),
            temperature: 0.8,
            max_tokens: 500,
            retry_attempts: 3,
            max_context_messages: 20,
            attempt_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Turns a user message plus context into exactly one reply string.
///
/// Every upstream failure is absorbed here: after `retry_attempts` failed
/// attempts a canned reply matching the last failure kind is returned.
pub struct CompletionGateway {
    backend: Arc<dyn CompletionBackend>,
    config: GatewayConfig,
    system_prompt: String,
    fallbacks: FallbackTable,
    rng: Mutex<StdRng>,
}

impl CompletionGateway {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        config: GatewayConfig,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            config,
            system_prompt: system_prompt.into(),
            fallbacks: FallbackTable::default(),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic fallback selection
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn with_fallbacks(mut self, fallbacks: FallbackTable) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn fallbacks(&self) -> &FallbackTable {
        &self.fallbacks
    }

    pub fn build_request(&self, user_message: &str, context: &[ChatMessage]) -> ChatCompletionRequest {
        let messages = assemble_messages(
            &self.system_prompt,
            context,
            user_message,
            self.config.max_context_messages,
        );
        debug!("Added {} context messages to payload", messages.len() - 2);

        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: messages.into_iter().map(RequestMessage::from).collect(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    /// Never fails: returns the first successful reply, or a fallback.
    pub async fn complete(&self, user_message: &str, context: &[ChatMessage], user_id: &str) -> String {
        let preview: String = user_message.chars().take(100).collect();
        info!("Sending message to LLM: {}...", preview);

        let request = self.build_request(user_message, context);
        self.run(&request, user_id).await
    }

    /// Image analysis: persona instruction plus one captioned image, no
    /// history. Same retry and fallback policy as text.
    pub async fn complete_image(&self, caption: &str, image: &ImageAttachment, user_id: &str) -> String {
        info!(
            user_id = %user_id,
            mime_type = %image.mime_type,
            image_bytes = image.approx_size(),
            "Sending image to LLM"
        );

        let prompt = format!("Analyze this image: {}", caption.trim());
        let request = ChatCompletionRequest {
            model: self.config.vision_model.clone(),
            messages: vec![
                RequestMessage::from(ChatMessage::system(IMAGE_SYSTEM_PROMPT)),
                RequestMessage::image(prompt.trim(), image),
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        self.run(&request, user_id).await
    }

    /// One call, no retries, bounded by `limit`.
    pub async fn check_endpoint(&self, limit: Duration) -> EndpointCheck {
        let request = self.build_request("test", &[]);
        let started = Instant::now();

        let health = match tokio::time::timeout(limit, self.backend.complete(&request)).await {
            Ok(Ok(_)) => EndpointHealth::Ready,
            Ok(Err(err)) => {
                warn!("Endpoint check failed: {}", err);
                EndpointHealth::Unavailable
            }
            Err(_) => EndpointHealth::Slow,
        };

        EndpointCheck {
            health,
            elapsed: started.elapsed(),
        }
    }

    async fn run(&self, request: &ChatCompletionRequest, user_id: &str) -> String {
        let attempts = self.config.retry_attempts.max(1);
        let mut last_kind = FailureKind::Unknown;

        for attempt in 0..attempts {
            let started = Instant::now();

            match self.attempt(request).await {
                Ok(reply) => {
                    info!(
                        user_id = %user_id,
                        model = %request.model,
                        payload_size = request.messages.len(),
                        attempt = attempt + 1,
                        response_time_ms = started.elapsed().as_millis() as u64,
                        event_type = "llm_request",
                        "LLM response received on attempt {}",
                        attempt + 1
                    );
                    return reply;
                }
                Err(err) => {
                    last_kind = err.kind();
                    warn!(
                        user_id = %user_id,
                        attempt = attempt + 1,
                        error_kind = %last_kind,
                        event_type = "llm_error",
                        "LLM request failed (attempt {}): {}",
                        attempt + 1,
                        err
                    );

                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.backoff_delay(attempt)).await;
                    }
                }
            }
        }

        error!(
            user_id = %user_id,
            error_kind = %last_kind,
            "All {} LLM attempts failed, using fallback",
            attempts
        );
        self.fallback(last_kind)
    }

    /// One bounded attempt. Blank replies count as failures.
    async fn attempt(&self, request: &ChatCompletionRequest) -> Result<String, CompletionError> {
        let timeout = self.config.attempt_timeout;

        let reply = tokio::time::timeout(timeout, self.backend.complete(request))
            .await
            .map_err(|_| CompletionError::Timeout(timeout))??;

        let reply = reply.trim();
        if reply.is_empty() {
            return Err(CompletionError::EmptyReply);
        }
        Ok(reply.to_string())
    }

    /// `backoff_base * 2^attempt_index`
    pub fn backoff_delay(&self, attempt_index: u32) -> Duration {
        self.config
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt_index))
    }

    pub fn fallback(&self, kind: FailureKind) -> String {
        let mut rng = self.rng.lock();
        self.fallbacks.pick(kind, &mut *rng)
    }
}

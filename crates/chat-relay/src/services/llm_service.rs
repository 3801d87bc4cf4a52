use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::LlmConfig;
use crate::services::completion::{ChatCompletionRequest, CompletionBackend, CompletionError};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a sarcastic consultant. Answer people's problems in a \
seemingly encouraging tone while subtly downplaying their efforts. Do it elegantly, through hidden \
sarcasm and pseudo-motivation that in fact diminishes the significance of what they did.";

// Local response structs
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

/// HTTP client for an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct LlmService {
    client: Client,
    api_url: String,
    timeout: Duration,
}

impl LlmService {
    pub fn new(config: &LlmConfig) -> Result<Self, CompletionError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| CompletionError::Other("API key is not a valid header value".to_string()))?;
        headers.insert(AUTHORIZATION, bearer);

        if let Some(referer) = config.referer.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert("http-referer", referer);
        }
        if let Some(title) = config.title.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert("x-title", title);
        }

        let timeout = config.timeout();
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| CompletionError::from_transport(e, timeout))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            timeout,
        })
    }

    /// Single non-streaming completion call.
    pub async fn generate_chat(&self, request: &ChatCompletionRequest) -> Result<String, CompletionError> {
        debug!("Starting chat generation with {} messages", request.messages.len());

        let response = self
            .client
            .post(&self.api_url)
            .json(request)
            .send()
            .await
            .map_err(|e| CompletionError::from_transport(e, self.timeout))?;

        match response.status().as_u16() {
            200 => {}
            429 => return Err(CompletionError::RateLimited),
            status @ (401 | 403) => return Err(CompletionError::Unauthorized(status)),
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(CompletionError::Status { status, body });
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::from_transport(e, self.timeout))?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            error!("Unexpected API response format: {}", body);
            CompletionError::InvalidResponse(e.to_string())
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CompletionError::InvalidResponse("no choices[0].message.content".to_string()))?;

        let content = content.trim();
        if content.is_empty() {
            return Err(CompletionError::EmptyReply);
        }

        let preview: String = content.chars().take(100).collect();
        info!("LLM response: {}...", preview);
        Ok(content.to_string())
    }
}

#[async_trait]
impl CompletionBackend for LlmService {
    async fn complete(&self, request: &ChatCompletionRequest) -> Result<String, CompletionError> {
        self.generate_chat(request).await
    }
}

/// Read the persona instruction, falling back to the built-in one.
pub fn load_system_prompt(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(prompt) if !prompt.trim().is_empty() => {
            info!("System prompt loaded from {}", path.display());
            prompt.trim().to_string()
        }
        Ok(_) => {
            warn!("System prompt file {} is empty, using default", path.display());
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("System prompt file not found, using default");
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
        Err(e) => {
            error!("Error loading system prompt: {}", e);
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::ChatMessage;
    use crate::services::completion::FailureKind;
    use serde_json::json;
    use std::path::PathBuf;
    use wiremock::matchers::{bearer_token, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> LlmConfig {
        LlmConfig {
            api_url: format!("{}/api/v1/chat/completions", server.uri()),
            api_key: "sk-test".to_string(),
            model: "test/model".to_string(),
            vision_model: None,
            temperature: 0.8,
            max_tokens: 500,
            timeout_seconds: 10,
            retry_attempts: 3,
            backoff_base_ms: 0,
            max_context_messages: 20,
            system_prompt_path: PathBuf::from("does/not/exist.txt"),
            referer: Some("https://example.org".to_string()),
            title: Some("Relay Tests".to_string()),
        }
    }

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "test/model".to_string(),
            messages: vec![ChatMessage::system("persona").into(), ChatMessage::user("hello").into()],
            temperature: 0.8,
            max_tokens: 500,
        }
    }

    #[tokio::test]
    async fn test_success_extracts_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(bearer_token("sk-test"))
            .and(header("X-Title", "Relay Tests"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "  Bravo.  "}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let service = LlmService::new(&config(&server)).unwrap();
        let reply = service.generate_chat(&request()).await.unwrap();
        assert_eq!(reply, "Bravo.");

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["model"], "test/model");
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_status_codes_map_to_kinds() {
        let cases = [
            (429, FailureKind::RateLimit),
            (401, FailureKind::AuthError),
            (500, FailureKind::ServerError),
            (502, FailureKind::ServerError),
            (404, FailureKind::Unknown),
        ];

        for (status, expected) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
                .mount(&server)
                .await;

            let service = LlmService::new(&config(&server)).unwrap();
            let err = service.generate_chat(&request()).await.unwrap_err();
            assert_eq!(err.kind(), expected, "status {}", status);
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let service = LlmService::new(&config(&server)).unwrap();
        let err = service.generate_chat(&request()).await.unwrap_err();
        assert!(matches!(err, CompletionError::InvalidResponse(_)));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let service = LlmService::new(&config(&server)).unwrap();
        let err = service.generate_chat(&request()).await.unwrap_err();
        assert!(matches!(err, CompletionError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_blank_content_is_empty_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "   "}}]
            })))
            .mount(&server)
            .await;

        let service = LlmService::new(&config(&server)).unwrap();
        let err = service.generate_chat(&request()).await.unwrap_err();
        assert!(matches!(err, CompletionError::EmptyReply));
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_secs(3))
                    .set_body_json(json!({"choices": [{"message": {"content": "late"}}]})),
            )
            .mount(&server)
            .await;

        let mut cfg = config(&server);
        cfg.timeout_seconds = 1;
        let service = LlmService::new(&cfg).unwrap();

        let err = service.generate_chat(&request()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert!(matches!(err, CompletionError::Timeout(d) if d == Duration::from_secs(1)));
        assert_eq!(err.to_string(), "Request timed out after 1s");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let server = MockServer::start().await;
        let mut cfg = config(&server);
        // Nothing listens on port 1
        cfg.api_url = "http://127.0.0.1:1/api/v1/chat/completions".to_string();

        let service = LlmService::new(&cfg).unwrap();
        let err = service.generate_chat(&request()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::NetworkError);
    }

    #[test]
    fn test_missing_prompt_file_uses_default() {
        let prompt = load_system_prompt(Path::new("does/not/exist.txt"));
        assert_eq!(prompt, DEFAULT_SYSTEM_PROMPT);
        assert!(prompt.to_lowercase().contains("sarcas"));
    }
}

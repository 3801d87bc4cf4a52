use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub history: HistoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    /// Model for image requests; `model` when unset
    #[serde(default)]
    pub vision_model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub backoff_base_ms: u64,
    pub max_context_messages: usize,
    pub system_prompt_path: PathBuf,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryConfig {
    pub max_messages: usize,
    pub session_ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl HistoryConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" for development, "json" for production
    pub format: String,
    pub directory: PathBuf,
    pub file_prefix: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        // Load from environment first
        dotenvy::dotenv().ok();

        let config = Self::builder()?
            // Load from config file
            .add_source(File::with_name("config/settings").required(false))
            // Override with environment variables (prefix: APP)
            // Example: APP_LLM__API_KEY=sk-...
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Builder pre-populated with the built-in defaults.
    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("llm.api_url", "https://openrouter.ai/api/v1/chat/completions")?
            .set_default("llm.api_key", "")?
            .set_default("llm.model", "openai/gpt-oss-20b:free")?
            .set_default("llm.temperature", 0.8)?
            .set_default("llm.max_tokens", 500)?
            .set_default("llm.timeout_seconds", 10)?
            .set_default("llm.retry_attempts", 3)?
            .set_default("llm.backoff_base_ms", 1000)?
            .set_default("llm.max_context_messages", 20)?
            .set_default("llm.system_prompt_path", "prompts/system.txt")?
            .set_default("history.max_messages", 20)?
            .set_default("history.session_ttl_seconds", 3600)?
            .set_default("history.sweep_interval_seconds", 300)?
            .set_default("logging.level", "info,chat_relay=debug")?
            .set_default("logging.format", "pretty")?
            .set_default("logging.directory", "logs")?
            .set_default("logging.file_prefix", "relay")?;

        Ok(builder)
    }

    fn validate(&self) -> Result<()> {
        if self.llm.api_key.trim().is_empty() {
            anyhow::bail!("llm.api_key is required (set APP_LLM__API_KEY)");
        }

        if self.llm.retry_attempts == 0 {
            anyhow::bail!("llm.retry_attempts must be at least 1");
        }

        if self.llm.max_context_messages < 2 {
            anyhow::bail!(
                "llm.max_context_messages must be at least 2, got {}",
                self.llm.max_context_messages
            );
        }

        if self.history.max_messages == 0 {
            anyhow::bail!("history.max_messages must be at least 1");
        }

        Ok(())
    }
}

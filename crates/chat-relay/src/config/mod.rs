pub mod settings;

pub use settings::{HistoryConfig, LlmConfig, LoggingConfig, ServerConfig, Settings};

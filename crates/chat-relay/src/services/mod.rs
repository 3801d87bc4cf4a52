pub mod completion;
pub mod conversation;
pub mod llm_service;

pub use completion::CompletionGateway;
pub use conversation::{ConversationManager, ConversationStore};
pub use llm_service::LlmService;

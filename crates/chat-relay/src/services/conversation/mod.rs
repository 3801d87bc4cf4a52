//! Conversation memory management module
//!
//! Provides in-memory per-user history with:
//! - Thread-safe storage (DashMap), FIFO cap per user
//! - Idle-session sweeping
//! - Dispatch glue tying the store to the completion gateway, per-user
//!   serialized

mod commands;
mod manager;
mod store;
pub mod types;

pub use commands::BotCommand;
pub use manager::{ConversationManager, RelayReply, MAX_IMAGE_BYTES};
pub use store::{ConversationStore, DEFAULT_MAX_MESSAGES, DEFAULT_SESSION_TTL};
pub use types::{DialogMessage, Session, StoreStats};

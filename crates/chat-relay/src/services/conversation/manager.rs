use chrono::Local;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::chat::{ImageAttachment, Role};
use crate::services::completion::{CompletionGateway, EndpointHealth};

use super::commands::{
    BotCommand, CLEARED_TEXT, HELP_TEXT, IMAGE_TOO_LARGE_TEXT, NOTHING_TO_CLEAR_TEXT,
    NOT_AN_IMAGE_TEXT, TEXT_ONLY_TEXT, WELCOME_TEXT,
};
use super::store::ConversationStore;

/// Largest accepted image, decoded
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

const STATUS_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Reply and the user's history length observed while still holding the
/// user's lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReply {
    pub reply: String,
    pub history_len: usize,
}

/// Glue between a chat transport, the history store and the completion
/// gateway. Both collaborators are injected; nothing here is global.
pub struct ConversationManager {
    store: Arc<ConversationStore>,
    gateway: Arc<CompletionGateway>,
    /// Serializes everything a single user sends, commands included
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ConversationManager {
    pub fn new(store: Arc<ConversationStore>, gateway: Arc<CompletionGateway>) -> Self {
        Self {
            store,
            gateway,
            user_locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<CompletionGateway> {
        &self.gateway
    }

    /// Entry point for every incoming message. `text` is the message text,
    /// or the caption when an image is attached. Always produces a reply.
    pub async fn respond(
        &self,
        user_id: &str,
        text: Option<&str>,
        image: Option<&ImageAttachment>,
    ) -> RelayReply {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let reply = match image {
            Some(image) => self.analyze_image(user_id, text, image).await,
            None => self.dispatch_text(user_id, text).await,
        };

        RelayReply {
            reply,
            history_len: self.store.message_count(user_id),
        }
    }

    /// Text-only shorthand for [`respond`](Self::respond).
    pub async fn handle_incoming(&self, user_id: &str, text: Option<&str>) -> String {
        self.respond(user_id, text, None).await.reply
    }

    /// Clear outside the command path, under the same per-user lock.
    pub async fn clear_history(&self, user_id: &str) -> bool {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.store.clear(user_id)
    }

    async fn dispatch_text(&self, user_id: &str, text: Option<&str>) -> String {
        let text = match text.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => {
                debug!("Non-text message from user {}", user_id);
                return TEXT_ONLY_TEXT.to_string();
            }
        };

        match BotCommand::parse(text) {
            Some(command) => self.run_command(user_id, command).await,
            None => self.process_message(user_id, text).await,
        }
    }

    async fn run_command(&self, user_id: &str, command: BotCommand) -> String {
        info!("User {} issued {:?}", user_id, command);

        match command {
            BotCommand::Start => WELCOME_TEXT.to_string(),
            BotCommand::Help => HELP_TEXT.to_string(),
            BotCommand::Clear => {
                if self.store.clear(user_id) {
                    CLEARED_TEXT.to_string()
                } else {
                    NOTHING_TO_CLEAR_TEXT.to_string()
                }
            }
            BotCommand::Status => self.status_text().await,
        }
    }

    /// Snapshot context, record the user message, complete, record the reply.
    async fn process_message(&self, user_id: &str, text: &str) -> String {
        let preview: String = text.chars().take(100).collect();
        info!(
            user_id = %user_id,
            message_length = text.chars().count(),
            event_type = "user_message",
            "User message: {}",
            preview
        );

        let context = self.store.context_snapshot(user_id);
        self.store.append(user_id, Role::User, text);

        let reply = self.gateway.complete(text, &context, user_id).await;
        self.store.append(user_id, Role::Assistant, reply.clone());

        info!(
            "Sent LLM response to user {} (history: {} messages)",
            user_id,
            self.store.message_count(user_id)
        );
        reply
    }

    /// Images are analyzed standalone and leave the history untouched.
    async fn analyze_image(&self, user_id: &str, caption: Option<&str>, image: &ImageAttachment) -> String {
        if !image.is_image() || image.data.trim().is_empty() {
            warn!("User {} sent a non-image attachment ({})", user_id, image.mime_type);
            return NOT_AN_IMAGE_TEXT.to_string();
        }

        let size = image.approx_size();
        if size > MAX_IMAGE_BYTES {
            warn!("User {} sent an oversized image ({} bytes)", user_id, size);
            return IMAGE_TOO_LARGE_TEXT.to_string();
        }

        let reply = self
            .gateway
            .complete_image(caption.unwrap_or_default(), image, user_id)
            .await;
        info!("Image analyzed for user {}", user_id);
        reply
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn status_text(&self) -> String {
        let check = self.gateway.check_endpoint(STATUS_CHECK_TIMEOUT).await;
        let endpoint = match check.health {
            EndpointHealth::Ready => "ready for sarcastic replies",
            EndpointHealth::Slow => "thinking slowly (as usual)",
            EndpointHealth::Unavailable => "temporarily unavailable",
        };

        let stats = self.store.stats();
        format!(
            "Diagnostics of my brilliant condition:\n\n\
             Bot: working perfectly (as always)\n\
             LLM API: {}\n\
             Memory: {} active dialogs, {} messages\n\
             Response time: {}ms\n\
             Checked at: {}\n\n\
             As you can see, I'm in excellent shape to hand out 'wise' advice!",
            endpoint,
            stats.active_sessions,
            stats.total_messages,
            check.elapsed.as_millis(),
            Local::now().format("%H:%M:%S")
        )
    }

    /// Sweep idle sessions and drop locks nobody holds for users without a session.
    pub fn run_maintenance(&self) -> usize {
        let swept = self.store.sweep_idle();
        self.user_locks
            .retain(|user_id, lock| Arc::strong_count(lock) > 1 || self.store.contains(user_id));
        swept
    }

    /// Periodic idle sweep on the tokio runtime.
    pub fn spawn_idle_sweeper(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                let swept = self.run_maintenance();
                if swept > 0 {
                    info!("Cleaned {} old sessions during maintenance", swept);
                }
            }
        })
    }
}

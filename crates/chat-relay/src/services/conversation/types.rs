use std::collections::VecDeque;
use tokio::time::Instant;

use crate::models::chat::{ChatMessage, Role};

/// One entry of a user's dialog. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct DialogMessage {
    pub role: Role,
    pub content: String,
    /// Monotonic creation time (tokio clock, so paused-time tests can advance it)
    pub created_at: Instant,
}

impl DialogMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Instant::now(),
        }
    }

    /// Projection used for completion context (timestamp dropped)
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}

/// Ordered, size-bounded message history of a single user.
#[derive(Debug, Clone, Default)]
pub struct Session {
    messages: VecDeque<DialogMessage>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a message and drop from the front until `len <= cap`.
    /// Returns how many old messages were evicted.
    pub fn push_bounded(&mut self, message: DialogMessage, cap: usize) -> usize {
        self.messages.push_back(message);

        let mut evicted = 0;
        while self.messages.len() > cap {
            self.messages.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> impl Iterator<Item = &DialogMessage> {
        self.messages.iter()
    }

    /// Most recent activity, None for an empty session
    pub fn last_activity(&self) -> Option<Instant> {
        self.messages.iter().map(|m| m.created_at).max()
    }

    /// Idle check against `now`; empty sessions always count as idle.
    pub fn is_idle(&self, now: Instant, ttl: std::time::Duration) -> bool {
        match self.last_activity() {
            Some(last) => now.saturating_duration_since(last) > ttl,
            None => true,
        }
    }
}

/// Store statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub active_sessions: usize,
    pub total_messages: usize,
}

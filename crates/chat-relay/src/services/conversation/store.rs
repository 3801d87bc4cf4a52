use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::models::chat::{ChatMessage, Role};
use super::types::{DialogMessage, Session, StoreStats};

pub const DEFAULT_MAX_MESSAGES: usize = 20;
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Thread-safe in-memory conversation history keyed by user id.
///
/// Uses DashMap so every mutation holds the shard lock of its user id only;
/// none of the operations suspends, so they are atomic from the async
/// scheduler's point of view. Constructed once and shared through `Arc`.
pub struct ConversationStore {
    /// Session storage: user_id -> Session
    sessions: DashMap<String, Session>,
    max_messages: usize,
    session_ttl: Duration,
}

impl ConversationStore {
    pub fn new(max_messages: usize, session_ttl: Duration) -> Self {
        info!(
            "Initializing conversation store: max_messages={}, session_ttl={:?}",
            max_messages, session_ttl
        );
        Self {
            sessions: DashMap::new(),
            max_messages: max_messages.max(1),
            session_ttl,
        }
    }

    /// Append a message to the user's session, creating it on first use.
    /// Oldest messages are dropped once the cap is exceeded.
    pub fn append(&self, user_id: &str, role: Role, content: impl Into<String>) {
        let message = DialogMessage::new(role, content);

        let mut session = self.sessions.entry(user_id.to_string()).or_insert_with(|| {
            info!(user_id = %user_id, event_type = "session_created", "Created new session");
            Session::new()
        });

        let evicted = session.push_bounded(message, self.max_messages);
        if evicted > 0 {
            debug!("Trimmed {} old messages for user {}", evicted, user_id);
        }

        debug!(
            "Added {} message to user {} history (total: {})",
            role.as_str(),
            user_id,
            session.len()
        );
    }

    /// Copy of the user's history in insertion order, timestamps omitted.
    pub fn context_snapshot(&self, user_id: &str) -> Vec<ChatMessage> {
        match self.sessions.get(user_id) {
            Some(session) => session.messages().map(DialogMessage::to_chat_message).collect(),
            None => {
                debug!("No history found for user {}", user_id);
                Vec::new()
            }
        }
    }

    /// Delete the user's session. Returns whether one existed.
    pub fn clear(&self, user_id: &str) -> bool {
        match self.sessions.remove(user_id) {
            Some((_, session)) => {
                info!("Cleared history for user {} ({} messages)", user_id, session.len());
                true
            }
            None => {
                debug!("No history to clear for user {}", user_id);
                false
            }
        }
    }

    pub fn message_count(&self, user_id: &str) -> usize {
        self.sessions.get(user_id).map(|s| s.len()).unwrap_or(0)
    }

    /// Remove sessions whose latest message is older than the TTL, plus any
    /// empty session. Returns number of sessions removed.
    pub fn sweep_idle(&self) -> usize {
        let now = Instant::now();
        let ttl = self.session_ttl;

        let mut count = 0;
        self.sessions.retain(|_, session| {
            let idle = session.is_idle(now, ttl);
            if idle {
                count += 1;
            }
            !idle
        });

        if count > 0 {
            info!(swept = count, event_type = "sessions_swept", "Cleared {} idle sessions", count);
        }

        count
    }

    /// Get number of active sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }

    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats::default();
        for entry in self.sessions.iter() {
            stats.active_sessions += 1;
            stats.total_messages += entry.value().len();
        }
        stats
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES, DEFAULT_SESSION_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn contents(store: &ConversationStore, user_id: &str) -> Vec<String> {
        store
            .context_snapshot(user_id)
            .into_iter()
            .map(|m| m.content)
            .collect()
    }

    #[test]
    fn test_store_basic_operations() {
        let store = ConversationStore::default();

        store.append("u1", Role::User, "hello");
        store.append("u1", Role::Assistant, "oh, hello");
        assert_eq!(store.message_count("u1"), 2);
        assert_eq!(store.session_count(), 1);

        let snapshot = store.context_snapshot("u1");
        assert_eq!(snapshot[0], ChatMessage::user("hello"));
        assert_eq!(snapshot[1], ChatMessage::assistant("oh, hello"));

        assert!(store.clear("u1"));
        assert_eq!(store.message_count("u1"), 0);
        assert!(store.context_snapshot("u1").is_empty());
    }

    #[test]
    fn test_unknown_user_is_empty() {
        let store = ConversationStore::default();
        assert_eq!(store.message_count("nobody"), 0);
        assert!(store.context_snapshot("nobody").is_empty());
        assert!(!store.contains("nobody"));
    }

    #[test]
    fn test_clear_without_session_is_noop() {
        let store = ConversationStore::default();
        store.append("other", Role::User, "x");

        assert!(!store.clear("nobody"));
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn test_count_is_min_of_appends_and_cap() {
        for appends in [0usize, 1, 4, 5, 6, 13] {
            let store = ConversationStore::new(5, DEFAULT_SESSION_TTL);
            for i in 0..appends {
                store.append("u", Role::User, format!("m{}", i));
            }

            assert_eq!(store.message_count("u"), appends.min(5));

            let expected: Vec<String> = (appends.saturating_sub(5)..appends)
                .map(|i| format!("m{}", i))
                .collect();
            assert_eq!(contents(&store, "u"), expected);
        }
    }

    #[test]
    fn test_newest_message_survives_overflow() {
        let store = ConversationStore::new(2, DEFAULT_SESSION_TTL);
        store.append("u", Role::User, "a");
        store.append("u", Role::Assistant, "b");
        store.append("u", Role::User, "c");

        assert_eq!(contents(&store, "u"), vec!["b", "c"]);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = ConversationStore::default();
        store.append("u", Role::User, "original");

        let mut snapshot = store.context_snapshot("u");
        snapshot[0].content.push_str(" (edited)");
        snapshot.push(ChatMessage::user("extra"));

        assert_eq!(contents(&store, "u"), vec!["original"]);
    }

    #[test]
    fn test_sessions_are_independent() {
        let store = ConversationStore::new(2, DEFAULT_SESSION_TTL);
        store.append("a", Role::User, "a1");
        store.append("b", Role::User, "b1");
        store.append("a", Role::User, "a2");
        store.append("a", Role::User, "a3");

        assert_eq!(contents(&store, "a"), vec!["a2", "a3"]);
        assert_eq!(contents(&store, "b"), vec!["b1"]);
        assert_eq!(
            store.stats(),
            StoreStats { active_sessions: 2, total_messages: 3 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_idle_sessions() {
        let store = ConversationStore::new(20, Duration::from_secs(3600));
        store.append("stale", Role::User, "old news");

        tokio::time::advance(Duration::from_secs(1800)).await;
        store.append("fresh", Role::User, "still here");

        tokio::time::advance(Duration::from_secs(1801)).await;

        assert_eq!(store.sweep_idle(), 1);
        assert!(!store.contains("stale"));
        assert_eq!(store.message_count("fresh"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_session_at_exact_ttl() {
        let store = ConversationStore::new(20, Duration::from_secs(60));
        store.append("u", Role::User, "hi");

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(store.sweep_idle(), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.sweep_idle(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_activity_keeps_session_alive() {
        let store = ConversationStore::new(20, Duration::from_secs(60));
        store.append("u", Role::User, "first");

        tokio::time::advance(Duration::from_secs(50)).await;
        store.append("u", Role::Assistant, "reply");

        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(store.sweep_idle(), 0);
        assert_eq!(store.message_count("u"), 2);
    }

    #[test]
    fn test_sweep_removes_empty_sessions() {
        let store = ConversationStore::default();
        store.sessions.insert("ghost".to_string(), Session::new());
        store.append("live", Role::User, "hi");

        assert_eq!(store.sweep_idle(), 1);
        assert!(!store.contains("ghost"));
        assert!(store.contains("live"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_for_different_users() {
        let store = Arc::new(ConversationStore::new(50, DEFAULT_SESSION_TTL));

        let handles: Vec<_> = (0..8)
            .map(|u| {
                let store = store.clone();
                tokio::spawn(async move {
                    let user_id = format!("user-{}", u);
                    for i in 0..30 {
                        store.append(&user_id, Role::User, format!("{}", i));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.session_count(), 8);
        for u in 0..8 {
            let user_id = format!("user-{}", u);
            let expected: Vec<String> = (0..30).map(|i| i.to_string()).collect();
            assert_eq!(contents(&store, &user_id), expected);
        }
    }
}

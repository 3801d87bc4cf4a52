use axum::extract::FromRef;
use std::sync::Arc;

use crate::services::{ConversationManager, ConversationStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub conversation_manager: Arc<ConversationManager>,
    pub store: Arc<ConversationStore>,
}

impl AppState {
    pub fn new(conversation_manager: Arc<ConversationManager>) -> Self {
        let store = conversation_manager.store().clone();
        Self {
            conversation_manager,
            store,
        }
    }
}

impl FromRef<AppState> for Arc<ConversationManager> {
    fn from_ref(state: &AppState) -> Self {
        state.conversation_manager.clone()
    }
}

impl FromRef<AppState> for Arc<ConversationStore> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

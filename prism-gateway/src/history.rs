//! History projection for backend requests.

use serde::{Deserialize, Serialize};

use crate::store::{ConversationStore, Role};

/// One `{role, content}` entry in a backend-bound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Project a session's stored history into the form chat backends consume:
/// a synthesized system entry followed by the stored messages in order.
///
/// Pure function of store state plus the supplied prompt. The system entry
/// exists only in the projection and is never stored or exposed to callers.
pub fn format_history(
    store: &ConversationStore,
    session_key: &str,
    system_prompt: &str,
) -> Vec<ChatMessage> {
    let history = store.get(session_key);

    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage {
        role: Role::System,
        content: system_prompt.to_string(),
    });
    messages.extend(history.into_iter().map(|m| ChatMessage {
        role: m.role,
        content: m.text,
    }));
    messages
}

//! Conversation storage.
//!
//! A process-local map from session key to an ordered, append-only message
//! history. Sessions come into existence on first append and live for the
//! process lifetime; there is no eviction or delete.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a conversation message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One conversation turn. Immutable once created.
///
/// Stored histories only ever contain user and assistant messages; the
/// system entry is synthesized at request-formatting time and never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier.
    pub id: String,
    /// Role of the sender.
    pub role: Role,
    /// Message text. May be empty (an image-only turn, for example).
    pub text: String,
    /// Creation time, Unix milliseconds. Non-decreasing within a session.
    pub timestamp: i64,
}

impl Message {
    fn new(role: Role, text: impl Into<String>, floor: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            // Clamp against the previous message so a clock step backwards
            // cannot reorder a session's timeline.
            timestamp: now_millis().max(floor),
        }
    }
}

/// Thread-safe store mapping session key → ordered message history.
///
/// `append` is atomic per call; concurrent turns on the same session may
/// interleave at the sequence level but never tear an individual append.
/// All methods are non-suspending.
#[derive(Debug, Default)]
pub struct ConversationStore {
    sessions: RwLock<HashMap<String, Vec<Message>>>,
}

impl ConversationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Full history for a session, oldest first.
    ///
    /// Unknown keys yield an empty history; reads never create entries.
    pub fn get(&self, session_key: &str) -> Vec<Message> {
        self.read()
            .get(session_key)
            .cloned()
            .unwrap_or_default()
    }

    /// Append a message to a session, creating the session if absent.
    /// Returns the stored message.
    pub fn append(&self, session_key: &str, role: Role, text: impl Into<String>) -> Message {
        let mut sessions = self.write();
        let history = sessions.entry(session_key.to_string()).or_default();
        let floor = history.last().map_or(0, |m| m.timestamp);
        let message = Message::new(role, text, floor);
        history.push(message.clone());
        message
    }

    /// Number of messages stored for a session.
    pub fn message_count(&self, session_key: &str) -> usize {
        self.read().get(session_key).map_or(0, Vec::len)
    }

    /// Number of sessions with at least one stored message.
    pub fn session_count(&self) -> usize {
        self.read().len()
    }

    // The critical sections below never panic, so poisoning is unreachable;
    // recover the guard rather than propagate an error the contract forbids.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<Message>>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<Message>>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Current time in milliseconds since the Unix epoch.
fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

//! Core data types used throughout Groundcrew.
//!
//! These types represent the chunks, messages, and session state that flow
//! through the ingestion, retrieval, and chat pipeline.

use serde::{Deserialize, Serialize};

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single chat message. Immutable once created; ordered by position in
/// its conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A segment of the concatenated knowledge-base text.
///
/// Chunk boundaries do not respect document boundaries: all extracted text
/// is concatenated before splitting, so a chunk may span two source PDFs.
/// Chunks are not retained outside the index artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_index: i64,
    pub text: String,
}

/// Explicit per-request session context.
///
/// Threaded through every chat handler instead of living in ambient
/// framework state. `current_chat_name` is the saved-conversation pointer:
/// when set, every assistant response re-persists the full message list
/// under that name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub current_chat_name: Option<String>,
}

//! Conversation persistence.
//!
//! Each owner gets a directory under the conversations root; each saved
//! conversation is one JSON file in it — an ordered array of messages with
//! `role` and `content` fields. (owner, name) is the durable key: save
//! overwrites, load reads the full sequence, delete removes the file.
//!
//! There is no locking. A single active writer per (owner, name) is
//! assumed; concurrent writers are an accepted risk at this deployment
//! scale, recorded in DESIGN.md rather than papered over.

use std::path::{Path, PathBuf};

use crate::models::Message;

/// Errors from the conversation store. `NotFound` is deliberately its own
/// variant so callers can distinguish "no such conversation" from real I/O
/// trouble.
#[derive(Debug)]
pub enum ChatError {
    NotFound { owner: String, name: String },
    InvalidName(String),
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::NotFound { owner, name } => {
                write!(f, "no conversation named '{}' for owner '{}'", name, owner)
            }
            ChatError::InvalidName(name) => write!(f, "invalid conversation name: '{}'", name),
            ChatError::Io(e) => write!(f, "conversation storage error: {}", e),
            ChatError::Serialization(e) => write!(f, "conversation serialization error: {}", e),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<std::io::Error> for ChatError {
    fn from(e: std::io::Error) -> Self {
        ChatError::Io(e)
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Serialization(e)
    }
}

/// File-backed store of named conversations, namespaced per owner.
#[derive(Debug, Clone)]
pub struct ChatStore {
    root: PathBuf,
}

impl ChatStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Names of every saved conversation for `owner`, sorted so the same
    /// directory state always lists identically. An owner with no saves
    /// yet gets an empty list.
    pub fn list(&self, owner: &str) -> Result<Vec<String>, ChatError> {
        let dir = self.owner_dir(owner)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Persist the full message sequence under (owner, name), overwriting
    /// any prior save. Used for the initial save and for every
    /// append-driven update alike.
    pub fn save(&self, owner: &str, name: &str, messages: &[Message]) -> Result<(), ChatError> {
        let path = self.conversation_path(owner, name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(messages)?;

        // Write-then-rename so a torn write never clobbers a prior save.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Load the full message sequence for (owner, name).
    pub fn load(&self, owner: &str, name: &str) -> Result<Vec<Message>, ChatError> {
        let path = self.conversation_path(owner, name)?;
        if !path.exists() {
            return Err(ChatError::NotFound {
                owner: owner.to_string(),
                name: name.to_string(),
            });
        }
        let bytes = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Remove the conversation. Deleting a name that does not exist is the
    /// distinct `NotFound` condition, so a double delete reports cleanly.
    pub fn delete(&self, owner: &str, name: &str) -> Result<(), ChatError> {
        let path = self.conversation_path(owner, name)?;
        if !path.exists() {
            return Err(ChatError::NotFound {
                owner: owner.to_string(),
                name: name.to_string(),
            });
        }
        std::fs::remove_file(&path)?;
        Ok(())
    }

    fn owner_dir(&self, owner: &str) -> Result<PathBuf, ChatError> {
        validate_component(owner)?;
        Ok(self.root.join(owner))
    }

    fn conversation_path(&self, owner: &str, name: &str) -> Result<PathBuf, ChatError> {
        validate_component(name)?;
        Ok(self.owner_dir(owner)?.join(format!("{}.json", name)))
    }
}

/// Owners and conversation names become path components, so they must not
/// be empty or smuggle in traversal.
fn validate_component(s: &str) -> Result<(), ChatError> {
    let ok = !s.is_empty()
        && s.len() <= 128
        && s != "."
        && s != ".."
        && !s.contains('/')
        && !s.contains('\\')
        && !s.contains('\0');
    if ok {
        Ok(())
    } else {
        Err(ChatError::InvalidName(s.to_string()))
    }
}

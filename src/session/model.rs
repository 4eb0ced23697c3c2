//! # Conversation Data Model
//!
//! Types shared by the session store, the lifecycle manager and the turn
//! pipeline.
//!
//! ## History Shape:
//! A well-formed history always looks like this:
//! 1. `system` - the interview instructions
//! 2. `assistant` - the greeting
//! 3. then `user` / `assistant` pairs, strictly alternating
//!
//! Anything else means the stored session is corrupted. The pipeline rejects
//! such sessions instead of trying to repair them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Who produced a conversation message.
///
/// Serialized in lowercase because that is what chat-completion providers
/// expect on the wire (`"system"`, `"user"`, `"assistant"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Interview instructions for the model
    System,
    /// A transcribed answer from the candidate
    User,
    /// A reply produced by the model (or the greeting)
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A persisted interview session.
///
/// ## Fields:
/// - `id`: assigned by the store at creation, never changes
/// - `secret_hash`: salted one-way hash of the bearer secret
/// - `history`: the ordered conversation, append-only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub secret_hash: String,
    pub history: Vec<ChatMessage>,
}

/// Reasons a stored history does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("history has {0} entries, expected at least 2")]
    TooShort(usize),

    #[error("entry {index} has role {found}, expected {expected}")]
    UnexpectedRole {
        index: usize,
        expected: Role,
        found: Role,
    },
}

/// Role expected at a given history index.
fn expected_role(index: usize) -> Role {
    match index {
        0 => Role::System,
        1 => Role::Assistant,
        // From index 2 onward: even = user, odd = assistant
        i if i % 2 == 0 => Role::User,
        _ => Role::Assistant,
    }
}

/// Check that `history` has the system/greeting prefix and strict
/// user/assistant alternation after it.
///
/// A history ending with a dangling `user` entry is also rejected: a turn only
/// ever persists the user prompt together with its reply.
pub fn validate_history(history: &[ChatMessage]) -> Result<(), HistoryError> {
    if history.len() < 2 {
        return Err(HistoryError::TooShort(history.len()));
    }

    for (index, message) in history.iter().enumerate() {
        let expected = expected_role(index);
        if message.role != expected {
            return Err(HistoryError::UnexpectedRole {
                index,
                expected,
                found: message.role,
            });
        }
    }

    if history.len() % 2 != 0 {
        // Odd length means the last entry is a user prompt without a reply
        let index = history.len() - 1;
        return Err(HistoryError::UnexpectedRole {
            index,
            expected: Role::Assistant,
            found: Role::User,
        });
    }

    Ok(())
}

impl Session {
    pub fn validate_history(&self) -> Result<(), HistoryError> {
        validate_history(&self.history)
    }
}

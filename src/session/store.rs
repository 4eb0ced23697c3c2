//! # Session Store
//!
//! Narrow persistence interface used by the lifecycle manager and the turn
//! pipeline, plus two backends:
//! - **InMemorySessionStore**: `HashMap` behind a tokio `RwLock`, for
//!   development and tests
//! - **SledSessionStore**: embedded sled database, sessions stored as JSON
//!
//! ## Concurrency Contract:
//! `replace_history` is a compare-and-swap. The caller passes the history
//! length it read; if the stored history changed in between, the write is
//! refused with [`StoreError::Conflict`]. For two concurrent turns on the same
//! session at most one replacement succeeds.

use crate::session::model::{ChatMessage, Session};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session {0} not found")]
    NotFound(String),

    /// The stored history is not the one the writer based its update on.
    #[error("session {id} changed concurrently (expected {expected} entries, found {found})")]
    Conflict {
        id: String,
        expected: usize,
        found: usize,
    },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Backend(format!("session encoding: {}", err))
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session and return the identifier assigned to it.
    async fn create_session(
        &self,
        secret_hash: String,
        history: Vec<ChatMessage>,
    ) -> Result<String, StoreError>;

    async fn get_session(&self, id: &str) -> Result<Session, StoreError>;

    /// Replace the history of `id`, provided it still has
    /// `expected_prior_length` entries and `history` only appends to it.
    async fn replace_history(
        &self,
        id: &str,
        expected_prior_length: usize,
        history: Vec<ChatMessage>,
    ) -> Result<(), StoreError>;

    /// Short name used in logs and the health endpoint.
    fn backend_name(&self) -> &'static str;
}

/// Shared precondition of both backends: same length as the writer saw, and
/// the new history keeps every stored entry in place.
fn check_replacement(
    id: &str,
    stored: &[ChatMessage],
    expected_prior_length: usize,
    history: &[ChatMessage],
) -> Result<(), StoreError> {
    let conflict = || StoreError::Conflict {
        id: id.to_string(),
        expected: expected_prior_length,
        found: stored.len(),
    };

    if stored.len() != expected_prior_length {
        return Err(conflict());
    }
    if history.len() < stored.len() || history[..stored.len()] != *stored {
        return Err(conflict());
    }
    Ok(())
}

/// Process-local store. Sessions are lost on restart.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(
        &self,
        secret_hash: String,
        history: Vec<ChatMessage>,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let session = Session {
            id: id.clone(),
            secret_hash,
            history,
        };
        self.sessions.write().await.insert(id.clone(), session);
        Ok(id)
    }

    async fn get_session(&self, id: &str) -> Result<Session, StoreError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn replace_history(
        &self,
        id: &str,
        expected_prior_length: usize,
        history: Vec<ChatMessage>,
    ) -> Result<(), StoreError> {
        // Check and write under one write guard
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        check_replacement(id, &session.history, expected_prior_length, &history)?;
        session.history = history;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Durable store on top of sled. Each session is one JSON value keyed by its id.
pub struct SledSessionStore {
    db: sled::Db,
}

impl SledSessionStore {
    /// Open or create the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn decode(bytes: &[u8]) -> Result<Session, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[async_trait]
impl SessionStore for SledSessionStore {
    async fn create_session(
        &self,
        secret_hash: String,
        history: Vec<ChatMessage>,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let session = Session {
            id: id.clone(),
            secret_hash,
            history,
        };
        let bytes = serde_json::to_vec(&session)?;

        // Insert only if the key is absent
        self.db
            .compare_and_swap(id.as_bytes(), None as Option<&[u8]>, Some(bytes))?
            .map_err(|_| StoreError::Backend(format!("session id {} already exists", id)))?;
        self.db.flush_async().await?;

        Ok(id)
    }

    async fn get_session(&self, id: &str) -> Result<Session, StoreError> {
        match self.db.get(id.as_bytes())? {
            Some(bytes) => Self::decode(&bytes),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn replace_history(
        &self,
        id: &str,
        expected_prior_length: usize,
        history: Vec<ChatMessage>,
    ) -> Result<(), StoreError> {
        let current = self
            .db
            .get(id.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut session = Self::decode(&current)?;

        check_replacement(id, &session.history, expected_prior_length, &history)?;

        let stored_len = session.history.len();
        session.history = history;
        let updated = serde_json::to_vec(&session)?;

        // Swap against the exact bytes we read; a writer in between makes this fail
        self.db
            .compare_and_swap(id.as_bytes(), Some(&current), Some(updated))?
            .map_err(|_| StoreError::Conflict {
                id: id.to_string(),
                expected: expected_prior_length,
                found: stored_len,
            })?;
        self.db.flush_async().await?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

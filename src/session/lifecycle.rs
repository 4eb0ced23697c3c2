//! # Session Lifecycle
//!
//! Creating a new interview session:
//! 1. Load the greeting assets
//! 2. Generate a plaintext secret and hash it
//! 3. Build the initial history `[system(prompt), assistant(greeting)]`
//! 4. Persist it; the store assigns the id
//! 5. Hand the id, the plaintext secret and the greeting back to the caller
//!
//! Each step can fail and nothing is persisted until step 4. The plaintext
//! secret exists only in the returned value; it is never stored or logged.

use crate::ai::assets::{AssetError, GreetingSource};
use crate::auth::credential::{self, CredentialError};
use crate::session::model::ChatMessage;
use crate::session::store::{SessionStore, StoreError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("greeting assets unavailable: {0}")]
    AssetUnavailable(#[from] AssetError),

    #[error("failed to hash session secret: {0}")]
    Encoding(#[from] CredentialError),

    #[error("failed to persist session: {0}")]
    Persistence(#[from] StoreError),
}

/// Everything the client needs to continue a freshly created session.
#[derive(Debug, Clone)]
pub struct StartedSession {
    pub id: String,
    /// Plaintext bearer secret, only ever returned here
    pub secret: String,
    pub greeting_text: String,
    /// Base64-encoded greeting audio
    pub greeting_audio: String,
}

pub struct SessionLifecycle {
    store: Arc<dyn SessionStore>,
    greetings: Arc<dyn GreetingSource>,
    secret_length: usize,
}

impl SessionLifecycle {
    pub fn new(
        store: Arc<dyn SessionStore>,
        greetings: Arc<dyn GreetingSource>,
        secret_length: usize,
    ) -> Self {
        Self {
            store,
            greetings,
            secret_length,
        }
    }

    pub async fn start_session(&self) -> Result<StartedSession, LifecycleError> {
        let greeting = self.greetings.greeting().await?;

        let secret = credential::generate_secret(self.secret_length);
        let secret_hash = credential::hash_secret(&secret)?;

        let history = vec![
            ChatMessage::system(greeting.system_prompt),
            ChatMessage::assistant(greeting.text.clone()),
        ];

        let id = self.store.create_session(secret_hash, history).await?;
        tracing::info!(session_id = %id, backend = self.store.backend_name(), "Session created");

        Ok(StartedSession {
            id,
            secret,
            greeting_text: greeting.text,
            greeting_audio: STANDARD.encode(&greeting.audio),
        })
    }
}

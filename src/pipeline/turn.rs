//! # Turn Pipeline
//!
//! One authenticated interview turn, start to finish:
//!
//! | Step        | What happens                                      | Failure              |
//! |-------------|---------------------------------------------------|----------------------|
//! | Load        | fetch the session                                 | `SessionNotFound`    |
//! | Authorize   | verify the presented secret against its hash      | `InvalidCredential`  |
//! | Transcribe  | audio -> text                                     | `TranscriptionFailed`, `EmptyTranscript` |
//! | Append      | `user(text)` onto a working copy of the history   | -                    |
//! | Complete    | whole working history -> candidate replies        | `CompletionFailed`, `NoCompletion` |
//! | Sanitize    | strip markup from the reply for speech            | -                    |
//! | Synthesize  | sanitized reply -> audio, read fully, base64      | `SynthesisFailed`    |
//! | Persist     | append `assistant(reply)` and compare-and-swap     | `PersistenceConflict` |
//!
//! Any failure ends the turn; nothing is retried. The stored session is only
//! written in the last step. A backend failure while persisting does not fail
//! the turn: the reply has already been paid for, so it is returned and the
//! inconsistency is logged.
//!
//! ## Cancellation:
//! If the request future is dropped before Persist, the turn stops at the
//! current await point and nothing is written. Persist itself runs on a
//! spawned task, so a write that has started always completes.

use crate::ai::sanitize::sanitize_for_speech;
use crate::ai::{AiClient, AiError, AudioUpload};
use crate::auth::credential::verify_secret;
use crate::auth::SessionCredential;
use crate::session::model::{ChatMessage, HistoryError};
use crate::session::store::{SessionStore, StoreError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::TryStreamExt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("presented secret does not match session {0}")]
    InvalidCredential(String),

    #[error("session {id} has a corrupted history: {source}")]
    CorruptedSession {
        id: String,
        #[source]
        source: HistoryError,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("transcription failed: {0}")]
    TranscriptionFailed(#[source] AiError),

    #[error("transcription produced no text")]
    EmptyTranscript,

    #[error("chat completion failed: {0}")]
    CompletionFailed(#[source] AiError),

    #[error("chat completion produced no reply")]
    NoCompletion,

    #[error("speech synthesis failed: {0}")]
    SynthesisFailed(#[source] AiError),

    #[error("session {0} was changed by a concurrent turn")]
    PersistenceConflict(String),

    #[error("session store error: {0}")]
    Persistence(#[source] StoreError),
}

/// What a successful turn hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The transcribed answer
    pub prompt_text: String,
    /// The model's reply exactly as stored in history
    pub reply_text: String,
    /// Base64-encoded synthesized reply
    pub reply_audio: String,
    /// False when the reply was computed but the history write failed
    pub persisted: bool,
}

pub struct TurnPipeline {
    ai: Arc<dyn AiClient>,
    store: Arc<dyn SessionStore>,
}

impl TurnPipeline {
    pub fn new(ai: Arc<dyn AiClient>, store: Arc<dyn SessionStore>) -> Self {
        Self { ai, store }
    }

    #[tracing::instrument(
        name = "turn",
        skip_all,
        fields(session_id = %credential.session_id, audio_bytes = audio.bytes.len())
    )]
    pub async fn process_turn(
        &self,
        credential: &SessionCredential,
        audio: AudioUpload,
    ) -> Result<TurnOutcome, TurnError> {
        let session_id = credential.session_id.as_str();

        // Load
        let session = self.store.get_session(session_id).await.map_err(|err| match err {
            StoreError::NotFound(id) => TurnError::SessionNotFound(id),
            other => TurnError::Persistence(other),
        })?;

        // Authorize
        if !verify_secret(credential.secret(), &session.secret_hash) {
            tracing::warn!("Presented secret did not verify");
            return Err(TurnError::InvalidCredential(session_id.to_string()));
        }

        session.validate_history().map_err(|source| TurnError::CorruptedSession {
            id: session_id.to_string(),
            source,
        })?;

        // Transcribe
        if audio.is_empty() {
            return Err(TurnError::InvalidInput("audio payload is empty".to_string()));
        }
        let transcript = self
            .ai
            .transcribe(&audio)
            .await
            .map_err(TurnError::TranscriptionFailed)?;
        // Blank only decides emptiness; the text is kept as transcribed
        if transcript.trim().is_empty() {
            return Err(TurnError::EmptyTranscript);
        }
        tracing::debug!(chars = transcript.len(), "Answer transcribed");

        // Append prompt to a working copy; the stored session is untouched
        let prior_len = session.history.len();
        let mut history = session.history;
        history.push(ChatMessage::user(transcript.clone()));

        // Complete, first candidate only
        let reply = self
            .ai
            .complete(&history)
            .await
            .map_err(TurnError::CompletionFailed)?
            .into_iter()
            .next()
            .filter(|reply| !reply.trim().is_empty())
            .ok_or(TurnError::NoCompletion)?;
        tracing::debug!(chars = reply.len(), "Reply received");

        // Sanitize + Synthesize
        let speech_text = sanitize_for_speech(&reply);
        let stream = self
            .ai
            .synthesize(&speech_text)
            .await
            .map_err(TurnError::SynthesisFailed)?;
        let audio_bytes: Vec<u8> = stream
            .try_fold(Vec::new(), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await
            .map_err(TurnError::SynthesisFailed)?;
        if audio_bytes.is_empty() {
            return Err(TurnError::SynthesisFailed(AiError::Decode(
                "provider returned no audio".to_string(),
            )));
        }
        let reply_audio = STANDARD.encode(&audio_bytes);

        // Persist
        history.push(ChatMessage::assistant(reply.clone()));
        let persisted = self.persist(session_id, prior_len, history).await?;

        tracing::info!(persisted, "Turn completed");
        Ok(TurnOutcome {
            prompt_text: transcript,
            reply_text: reply,
            reply_audio,
            persisted,
        })
    }

    /// Write the new history. `Ok(false)` means the write failed for a reason
    /// other than a concurrent update and the turn should still be reported.
    async fn persist(
        &self,
        session_id: &str,
        prior_len: usize,
        history: Vec<ChatMessage>,
    ) -> Result<bool, TurnError> {
        let store = self.store.clone();
        let id = session_id.to_string();
        let write = tokio::spawn(async move { store.replace_history(&id, prior_len, history).await });

        match write.await {
            Ok(Ok(())) => Ok(true),
            Ok(Err(StoreError::Conflict { expected, found, .. })) => {
                tracing::warn!(expected, found, "History changed during turn, reply discarded");
                Err(TurnError::PersistenceConflict(session_id.to_string()))
            }
            Ok(Err(err)) => {
                tracing::error!(error = %err, "Reply delivered but history was not saved");
                Ok(false)
            }
            Err(err) => {
                tracing::error!(error = %err, "History write task failed, reply delivered unsaved");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::lifecycle::SessionLifecycle;
    use crate::session::model::Role;
    use crate::session::store::InMemorySessionStore;
    use crate::testing::{StaticGreeting, StubAi, WriteFailingStore};
    use std::time::Duration;
    use tokio::sync::Barrier;

    async fn started_session(store: Arc<dyn SessionStore>) -> SessionCredential {
        let lifecycle = SessionLifecycle::new(store, Arc::new(StaticGreeting::welcome()), 10);
        let started = lifecycle.start_session().await.unwrap();
        SessionCredential::new(started.id, started.secret)
    }

    fn audio() -> AudioUpload {
        AudioUpload::new(b"audio of an answer".to_vec())
    }

    #[tokio::test]
    async fn test_turn_scenario() {
        let store = Arc::new(InMemorySessionStore::new());
        let credential = started_session(store.clone()).await;
        let ai = Arc::new(StubAi::new("I have 5 years experience", "Great, tell me more."));
        let pipeline = TurnPipeline::new(ai.clone(), store.clone());

        let outcome = pipeline.process_turn(&credential, audio()).await.unwrap();
        assert_eq!(outcome.prompt_text, "I have 5 years experience");
        assert_eq!(outcome.reply_text, "Great, tell me more.");
        assert_eq!(outcome.reply_audio, STANDARD.encode(b"REPLY-AUDIO"));
        assert!(outcome.persisted);

        let history = store.get_session(&credential.session_id).await.unwrap().history;
        assert_eq!(history.len(), 4);
        assert_eq!(history[2], ChatMessage::user("I have 5 years experience"));
        assert_eq!(history[3], ChatMessage::assistant("Great, tell me more."));
    }

    #[tokio::test]
    async fn test_transcript_is_stored_as_transcribed() {
        let store = Arc::new(InMemorySessionStore::new());
        let credential = started_session(store.clone()).await;
        let ai = Arc::new(StubAi::new(" I like Rust.\n", "Why?"));
        let pipeline = TurnPipeline::new(ai.clone(), store.clone());

        let outcome = pipeline.process_turn(&credential, audio()).await.unwrap();
        assert_eq!(outcome.prompt_text, " I like Rust.\n");

        let history = store.get_session(&credential.session_id).await.unwrap().history;
        assert_eq!(history[2], ChatMessage::user(" I like Rust.\n"));
    }

    #[tokio::test]
    async fn test_completion_sees_whole_history() {
        let store = Arc::new(InMemorySessionStore::new());
        let credential = started_session(store.clone()).await;
        let ai = Arc::new(StubAi::new("second answer", "Noted."));
        let pipeline = TurnPipeline::new(ai.clone(), store.clone());

        pipeline.process_turn(&credential, audio()).await.unwrap();
        pipeline.process_turn(&credential, audio()).await.unwrap();

        let seen = ai.last_history().unwrap();
        let roles: Vec<Role> = seen.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::Assistant, Role::User, Role::Assistant, Role::User]
        );

        let stored = store.get_session(&credential.session_id).await.unwrap();
        assert_eq!(stored.history.len(), 6);
        assert!(stored.validate_history().is_ok());
    }

    #[tokio::test]
    async fn test_history_keeps_markup_speech_does_not() {
        let store = Arc::new(InMemorySessionStore::new());
        let credential = started_session(store.clone()).await;
        let reply = "**Great**, tell me about:\n- Rust\n- Go";
        let ai = Arc::new(StubAi::new("I code", reply));
        let pipeline = TurnPipeline::new(ai.clone(), store.clone());

        let outcome = pipeline.process_turn(&credential, audio()).await.unwrap();
        assert_eq!(outcome.reply_text, reply);
        assert_eq!(ai.last_synthesized().unwrap(), "Great, tell me about:, Rust, Go");

        let history = store.get_session(&credential.session_id).await.unwrap().history;
        assert_eq!(history[3].content, reply);
    }

    #[tokio::test]
    async fn test_only_first_candidate_is_used() {
        let store = Arc::new(InMemorySessionStore::new());
        let credential = started_session(store.clone()).await;
        let mut stub = StubAi::new("hello", "first");
        stub.choices.push("second".to_string());
        let pipeline = TurnPipeline::new(Arc::new(stub), store.clone());

        let outcome = pipeline.process_turn(&credential, audio()).await.unwrap();
        assert_eq!(outcome.reply_text, "first");
    }

    #[tokio::test]
    async fn test_wrong_secret_changes_nothing() {
        let store = Arc::new(InMemorySessionStore::new());
        let credential = started_session(store.clone()).await;
        let before = store.get_session(&credential.session_id).await.unwrap();
        let ai = Arc::new(StubAi::new("hello", "hi"));
        let pipeline = TurnPipeline::new(ai.clone(), store.clone());

        let wrong = SessionCredential::new(credential.session_id.clone(), "not-the-secret");
        let err = pipeline.process_turn(&wrong, audio()).await.unwrap_err();
        assert!(matches!(err, TurnError::InvalidCredential(_)));
        assert_eq!(ai.total_calls(), 0);
        assert_eq!(store.get_session(&credential.session_id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let store = Arc::new(InMemorySessionStore::new());
        let ai = Arc::new(StubAi::new("hello", "hi"));
        let pipeline = TurnPipeline::new(ai.clone(), store);

        let credential = SessionCredential::new("missing", "secret");
        let err = pipeline.process_turn(&credential, audio()).await.unwrap_err();
        assert!(matches!(err, TurnError::SessionNotFound(_)));
        assert_eq!(ai.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_audio_is_rejected_before_transcription() {
        let store = Arc::new(InMemorySessionStore::new());
        let credential = started_session(store.clone()).await;
        let ai = Arc::new(StubAi::new("hello", "hi"));
        let pipeline = TurnPipeline::new(ai.clone(), store);

        let err = pipeline.process_turn(&credential, AudioUpload::new(Vec::new())).await.unwrap_err();
        assert!(matches!(err, TurnError::InvalidInput(_)));
        assert_eq!(ai.transcribe_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_transcript_stops_the_turn() {
        let store = Arc::new(InMemorySessionStore::new());
        let credential = started_session(store.clone()).await;
        let ai = Arc::new(StubAi::new("   ", "hi"));
        let pipeline = TurnPipeline::new(ai.clone(), store.clone());

        let err = pipeline.process_turn(&credential, audio()).await.unwrap_err();
        assert!(matches!(err, TurnError::EmptyTranscript));
        assert_eq!(ai.complete_calls(), 0);
        assert_eq!(ai.synthesize_calls(), 0);
        assert_eq!(store.get_session(&credential.session_id).await.unwrap().history.len(), 2);
    }

    #[tokio::test]
    async fn test_provider_failures_map_to_their_step() {
        let store = Arc::new(InMemorySessionStore::new());
        let credential = started_session(store.clone()).await;

        let mut stub = StubAi::new("hello", "hi");
        stub.fail_transcribe = true;
        let err = TurnPipeline::new(Arc::new(stub), store.clone())
            .process_turn(&credential, audio())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::TranscriptionFailed(_)));

        let mut stub = StubAi::new("hello", "hi");
        stub.fail_complete = true;
        let err = TurnPipeline::new(Arc::new(stub), store.clone())
            .process_turn(&credential, audio())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::CompletionFailed(_)));

        let mut stub = StubAi::new("hello", "hi");
        stub.choices.clear();
        let err = TurnPipeline::new(Arc::new(stub), store.clone())
            .process_turn(&credential, audio())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::NoCompletion));

        let mut stub = StubAi::new("hello", "hi");
        stub.fail_synthesize = true;
        let err = TurnPipeline::new(Arc::new(stub), store.clone())
            .process_turn(&credential, audio())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::SynthesisFailed(_)));

        // None of the failed turns left anything behind
        assert_eq!(store.get_session(&credential.session_id).await.unwrap().history.len(), 2);
    }

    #[tokio::test]
    async fn test_corrupted_history_is_rejected() {
        let store = Arc::new(InMemorySessionStore::new());
        let id = store
            .create_session(
                crate::auth::credential::hash_secret("secret").unwrap(),
                vec![ChatMessage::system("rules"), ChatMessage::user("out of order")],
            )
            .await
            .unwrap();
        let ai = Arc::new(StubAi::new("hello", "hi"));
        let pipeline = TurnPipeline::new(ai.clone(), store);

        let err = pipeline
            .process_turn(&SessionCredential::new(id, "secret"), audio())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::CorruptedSession { .. }));
        assert_eq!(ai.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_still_returns_reply() {
        let store = Arc::new(WriteFailingStore::default());
        let credential = started_session(store.clone()).await;
        let pipeline = TurnPipeline::new(Arc::new(StubAi::new("hello", "hi")), store.clone());

        let outcome = pipeline.process_turn(&credential, audio()).await.unwrap();
        assert_eq!(outcome.reply_text, "hi");
        assert!(!outcome.persisted);
        assert_eq!(store.get_session(&credential.session_id).await.unwrap().history.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_turns_on_one_session() {
        let store = Arc::new(InMemorySessionStore::new());
        let credential = started_session(store.clone()).await;
        let mut stub = StubAi::new("hello", "hi");
        // Both turns load the session before either reaches persist
        stub.complete_barrier = Some(Arc::new(Barrier::new(2)));
        let pipeline = Arc::new(TurnPipeline::new(Arc::new(stub), store.clone()));

        let first = {
            let pipeline = pipeline.clone();
            let credential = credential.clone();
            tokio::spawn(async move { pipeline.process_turn(&credential, audio()).await })
        };
        let second = {
            let pipeline = pipeline.clone();
            let credential = credential.clone();
            tokio::spawn(async move { pipeline.process_turn(&credential, audio()).await })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let conflicted = results
            .iter()
            .filter(|r| matches!(r, Err(TurnError::PersistenceConflict(_))))
            .count();
        assert_eq!(succeeded, 1);
        assert_eq!(conflicted, 1);
        assert_eq!(store.get_session(&credential.session_id).await.unwrap().history.len(), 4);
    }

    #[tokio::test]
    async fn test_abandoned_turn_writes_nothing() {
        let store = Arc::new(InMemorySessionStore::new());
        let credential = started_session(store.clone()).await;
        let mut stub = StubAi::new("hello", "hi");
        stub.synthesize_delay = Some(Duration::from_secs(30));
        let pipeline = TurnPipeline::new(Arc::new(stub), store.clone());

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            pipeline.process_turn(&credential, audio()),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(store.get_session(&credential.session_id).await.unwrap().history.len(), 2);
    }
}

//! Test doubles for the adapter traits, shared by the unit tests.

use crate::ai::assets::{AssetError, Greeting, GreetingSource};
use crate::ai::{AiClient, AiError, AudioStream, AudioUpload};
use crate::session::model::{ChatMessage, Session};
use crate::session::store::{InMemorySessionStore, SessionStore, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

pub struct StaticGreeting(pub Greeting);

impl StaticGreeting {
    pub fn welcome() -> Self {
        Self(Greeting {
            system_prompt: "You are an interviewer.".to_string(),
            text: "Welcome".to_string(),
            audio: b"AUDIO".to_vec(),
        })
    }
}

#[async_trait]
impl GreetingSource for StaticGreeting {
    async fn greeting(&self) -> Result<Greeting, AssetError> {
        Ok(self.0.clone())
    }
}

pub struct MissingGreeting;

#[async_trait]
impl GreetingSource for MissingGreeting {
    async fn greeting(&self) -> Result<Greeting, AssetError> {
        Err(AssetError::Empty(PathBuf::from("greeting.txt")))
    }
}

/// Store whose every operation fails with a backend error.
#[derive(Default)]
pub struct FailingStore {
    creates: AtomicUsize,
}

impl FailingStore {
    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for FailingStore {
    async fn create_session(&self, _: String, _: Vec<ChatMessage>) -> Result<String, StoreError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Backend("disk full".to_string()))
    }

    async fn get_session(&self, _: &str) -> Result<Session, StoreError> {
        Err(StoreError::Backend("disk full".to_string()))
    }

    async fn replace_history(&self, _: &str, _: usize, _: Vec<ChatMessage>) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk full".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

/// In-memory store that accepts reads and creates but refuses history writes.
#[derive(Default)]
pub struct WriteFailingStore {
    pub inner: InMemorySessionStore,
}

#[async_trait]
impl SessionStore for WriteFailingStore {
    async fn create_session(&self, hash: String, history: Vec<ChatMessage>) -> Result<String, StoreError> {
        self.inner.create_session(hash, history).await
    }

    async fn get_session(&self, id: &str) -> Result<Session, StoreError> {
        self.inner.get_session(id).await
    }

    async fn replace_history(&self, _: &str, _: usize, _: Vec<ChatMessage>) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection reset".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "write-failing"
    }
}

/// Scriptable AI client that records how it was called.
pub struct StubAi {
    pub transcript: String,
    pub choices: Vec<String>,
    pub audio: Vec<u8>,
    pub fail_transcribe: bool,
    pub fail_complete: bool,
    pub fail_synthesize: bool,
    /// Every `complete` call waits here before answering
    pub complete_barrier: Option<Arc<Barrier>>,
    /// Delay before the synthesized stream is returned
    pub synthesize_delay: Option<Duration>,
    transcribe_calls: AtomicUsize,
    complete_calls: AtomicUsize,
    synthesize_calls: AtomicUsize,
    last_history: Mutex<Option<Vec<ChatMessage>>>,
    last_synthesized: Mutex<Option<String>>,
}

impl StubAi {
    pub fn new(transcript: &str, reply: &str) -> Self {
        Self {
            transcript: transcript.to_string(),
            choices: vec![reply.to_string()],
            audio: b"REPLY-AUDIO".to_vec(),
            fail_transcribe: false,
            fail_complete: false,
            fail_synthesize: false,
            complete_barrier: None,
            synthesize_delay: None,
            transcribe_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
            synthesize_calls: AtomicUsize::new(0),
            last_history: Mutex::new(None),
            last_synthesized: Mutex::new(None),
        }
    }

    pub fn transcribe_calls(&self) -> usize {
        self.transcribe_calls.load(Ordering::SeqCst)
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn synthesize_calls(&self) -> usize {
        self.synthesize_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.transcribe_calls() + self.complete_calls() + self.synthesize_calls()
    }

    pub fn last_history(&self) -> Option<Vec<ChatMessage>> {
        self.last_history.lock().unwrap().clone()
    }

    pub fn last_synthesized(&self) -> Option<String> {
        self.last_synthesized.lock().unwrap().clone()
    }
}

#[async_trait]
impl AiClient for StubAi {
    async fn transcribe(&self, _audio: &AudioUpload) -> Result<String, AiError> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_transcribe {
            return Err(AiError::Status { status: 500, body: "whisper down".to_string() });
        }
        Ok(self.transcript.clone())
    }

    async fn complete(&self, history: &[ChatMessage]) -> Result<Vec<String>, AiError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_history.lock().unwrap() = Some(history.to_vec());
        if let Some(barrier) = &self.complete_barrier {
            barrier.wait().await;
        }
        if self.fail_complete {
            return Err(AiError::Request("connection refused".to_string()));
        }
        Ok(self.choices.clone())
    }

    async fn synthesize(&self, text: &str) -> Result<AudioStream, AiError> {
        self.synthesize_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_synthesized.lock().unwrap() = Some(text.to_string());
        if let Some(delay) = self.synthesize_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_synthesize {
            return Err(AiError::Status { status: 503, body: "tts busy".to_string() });
        }

        // Two chunks, to exercise reassembly
        let (head, tail) = self.audio.split_at(self.audio.len() / 2);
        let chunks = vec![Ok(Bytes::copy_from_slice(head)), Ok(Bytes::copy_from_slice(tail))];
        Ok(futures_util::stream::iter(chunks).boxed())
    }
}

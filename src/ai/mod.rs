//! # AI Capabilities
//!
//! The three provider operations an interview turn needs, behind one trait so
//! the pipeline can be driven by the real OpenAI client or by test doubles:
//! - **transcribe**: recorded answer -> text
//! - **complete**: full conversation -> candidate replies
//! - **synthesize**: reply text -> audio byte stream
//!
//! Also home to the greeting asset source and the speech text sanitizer.

pub mod assets;
pub mod openai;
pub mod sanitize;

use crate::session::model::ChatMessage;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;

pub use assets::FileGreetingSource;
pub use openai::OpenAiClient;

/// Streamed audio returned by speech synthesis.
pub type AudioStream = BoxStream<'static, Result<Bytes, AiError>>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected provider response: {0}")]
    Decode(String),
}

/// A recorded answer as uploaded by the client.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: Option<String>,
}

impl AudioUpload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self::with_metadata(bytes, None, None)
    }

    /// Build an upload from what the client sent.
    ///
    /// The transcription provider detects the format from the file extension,
    /// so a missing file name is derived from the content type.
    pub fn with_metadata(bytes: Vec<u8>, file_name: Option<String>, content_type: Option<String>) -> Self {
        let file_name = file_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("audio.{}", extension_for(content_type.as_deref())));
        Self {
            bytes,
            file_name,
            content_type,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// File extension for an audio MIME type; `wav` when unknown.
fn extension_for(content_type: Option<&str>) -> &'static str {
    let essence = content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase());

    match essence.as_deref() {
        Some("audio/webm") | Some("video/webm") => "webm",
        Some("audio/ogg") | Some("audio/opus") => "ogg",
        Some("audio/mpeg") | Some("audio/mp3") => "mp3",
        Some("audio/mp4") | Some("audio/m4a") | Some("audio/x-m4a") => "m4a",
        Some("video/mp4") => "mp4",
        Some("audio/flac") | Some("audio/x-flac") => "flac",
        _ => "wav",
    }
}

#[async_trait]
pub trait AiClient: Send + Sync {
    /// Transcribe recorded speech. An empty string means nothing was recognised.
    async fn transcribe(&self, audio: &AudioUpload) -> Result<String, AiError>;

    /// Ask the model for the next assistant message given the whole history.
    ///
    /// Returns every candidate the provider produced, in provider order. An
    /// empty list means the provider answered without a candidate.
    async fn complete(&self, history: &[ChatMessage]) -> Result<Vec<String>, AiError>;

    /// Synthesize speech for `text`.
    async fn synthesize(&self, text: &str) -> Result<AudioStream, AiError>;
}

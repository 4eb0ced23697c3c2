//! # OpenAI Client
//!
//! [`AiClient`] over the OpenAI REST API:
//! - `POST {base}/audio/transcriptions` (multipart upload)
//! - `POST {base}/chat/completions`
//! - `POST {base}/audio/speech` (body streamed back as audio)
//!
//! Non-2xx answers become [`AiError::Status`]. Nothing is retried here.

use crate::ai::{AiClient, AiError, AudioStream, AudioUpload};
use crate::config::OpenAiConfig;
use crate::session::model::ChatMessage;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct OpenAiClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, AiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AiError::Request(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Pass successful responses through, turn anything else into `Status`.
    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, AiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(AiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    fn request_error(err: reqwest::Error) -> AiError {
        AiError::Request(err.to_string())
    }
}

#[async_trait]
impl AiClient for OpenAiClient {
    async fn transcribe(&self, audio: &AudioUpload) -> Result<String, AiError> {
        let mut part = reqwest::multipart::Part::bytes(audio.bytes.clone())
            .file_name(audio.file_name.clone());
        if let Some(content_type) = &audio.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|e| AiError::Request(format!("invalid audio content type: {}", e)))?;
        }

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.config.transcript_model.clone())
            .text("language", self.config.transcript_language.clone());

        let resp = self
            .client
            .post(self.endpoint("audio/transcriptions"))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(Self::request_error)?;

        let transcript: TranscriptResponse = Self::check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| AiError::Decode(e.to_string()))?;

        tracing::debug!(chars = transcript.text.len(), "Transcription received");
        Ok(transcript.text)
    }

    async fn complete(&self, history: &[ChatMessage]) -> Result<Vec<String>, AiError> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: history,
        };

        let resp = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(Self::request_error)?;

        let completion: ChatResponse = Self::check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| AiError::Decode(e.to_string()))?;

        Ok(completion
            .choices
            .into_iter()
            .filter_map(|choice| choice.message.content)
            .collect())
    }

    async fn synthesize(&self, text: &str) -> Result<AudioStream, AiError> {
        let request = SpeechRequest {
            model: &self.config.tts_model,
            voice: &self.config.tts_voice,
            input: text,
        };

        let resp = self
            .client
            .post(self.endpoint("audio/speech"))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(Self::request_error)?;

        let resp = Self::check_status(resp).await?;
        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(Self::request_error))
            .boxed())
    }
}

//! # Response Envelope
//!
//! Every endpoint answers with the same JSON shape:
//!
//! ```json
//! { "message": "success", "data": { ... } }
//! ```
//!
//! Failures carry only a `message`. Each endpoint has its own typed payload,
//! so nothing is assembled from untyped JSON values.

use serde::Serialize;

/// Success or failure body, serialized uniformly.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ApiResponse<T: Serialize> {
    Success { message: String, data: T },
    Failure { message: String },
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        ApiResponse::Success {
            message: message.into(),
            data,
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(message: impl Into<String>) -> Self {
        ApiResponse::Failure {
            message: message.into(),
        }
    }
}

/// Text plus optional base64 audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatPayload {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

/// Data of `GET /chat/start`.
#[derive(Debug, Serialize)]
pub struct StartChatData {
    pub id: String,
    pub secret: String,
    pub chat: ChatPayload,
}

/// Data of `POST /chat/answer`.
#[derive(Debug, Serialize)]
pub struct AnswerChatData {
    pub prompt: ChatPayload,
    pub answer: ChatPayload,
}

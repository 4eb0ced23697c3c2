//! # Chat Endpoints
//!
//! - `GET /chat/start`: create a session and return its greeting
//! - `POST /chat/answer`: submit one recorded answer, get the spoken reply
//!
//! Handlers only translate between HTTP and the domain services in
//! [`AppState`]; all decisions live in `session` and `pipeline`.

use crate::ai::AudioUpload;
use crate::auth::SessionCredential;
use crate::error::{AppError, AppResult};
use crate::handlers::response::{AnswerChatData, ApiResponse, ChatPayload, StartChatData};
use crate::state::AppState;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt;

/// Name of the multipart field carrying the recorded answer.
pub const AUDIO_FIELD: &str = "file";

/// Start a new interview session.
///
/// The plaintext secret is in this response and nowhere else; the client
/// must keep it to answer.
pub async fn start_chat(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let started = state.lifecycle.start_session().await?;
    state.record_session_started();
    tracing::info!(session_id = %started.id, "Session started");

    Ok(HttpResponse::Ok().json(ApiResponse::success(
        "a new chat created",
        StartChatData {
            id: started.id,
            secret: started.secret,
            chat: ChatPayload {
                text: started.greeting_text,
                audio: Some(started.greeting_audio),
            },
        },
    )))
}

/// Run one interview turn for the authenticated session.
pub async fn answer_chat(
    state: web::Data<AppState>,
    credential: SessionCredential,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    let audio = read_audio_field(payload, state.config.server.max_upload_bytes).await?;

    let outcome = match state.pipeline.process_turn(&credential, audio).await {
        Ok(outcome) => outcome,
        Err(err) => {
            state.record_turn_failed();
            return Err(err.into());
        }
    };
    state.record_turn_completed(outcome.persisted);

    Ok(HttpResponse::Ok().json(ApiResponse::success(
        "success",
        AnswerChatData {
            prompt: ChatPayload {
                text: outcome.prompt_text,
                audio: None,
            },
            answer: ChatPayload {
                text: outcome.reply_text,
                audio: Some(outcome.reply_audio),
            },
        },
    )))
}

/// Pull the `file` field out of the multipart body, skipping any others.
///
/// Reading stops as soon as the field grows past `max_bytes`.
async fn read_audio_field(mut payload: Multipart, max_bytes: usize) -> AppResult<AudioUpload> {
    while let Some(mut field) = payload.try_next().await? {
        if field.name() != Some(AUDIO_FIELD) {
            while field.try_next().await?.is_some() {}
            continue;
        }

        let file_name = field
            .content_disposition()
            .and_then(|disposition| disposition.get_filename())
            .map(str::to_string);
        let content_type = field.content_type().map(|mime| mime.to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            if bytes.len() + chunk.len() > max_bytes {
                tracing::info!(limit = max_bytes, "Rejected oversized answer upload");
                return Err(AppError::PayloadTooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }

        return Ok(AudioUpload::with_metadata(bytes, file_name, content_type));
    }

    Err(AppError::BadRequest("required file is missing".to_string()))
}

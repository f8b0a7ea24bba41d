//! Streaming chat endpoint.
//!
//! POST /chat
//!
//! The response body is the upstream event stream forwarded byte for byte,
//! always terminated by `data: [DONE]`; the relay appends one when the
//! upstream closes without it. Upstream failures arrive in-band as an error
//! frame, so once the stream starts the status is 200. Rejections
//! that happen before any upstream call (empty message, daily turn limit)
//! are ordinary JSON errors.
//!
//! Dropping the response (client abort) stops forwarding only; the reply is
//! still collected and persisted in the background.

use std::convert::Infallible;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;
use futures_util::StreamExt;
use serde::Deserialize;

use tutorlab_core::chat::{ChatRequest, ChatStream};
use tutorlab_types::llm::HistoryEntry;

use crate::http::error::AppError;
use crate::http::extractors::auth::Participant;
use crate::state::AppState;

/// Request body for the chat endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    pub message: String,
    /// Prior turns as the client shows them.
    #[serde(default)]
    pub conversation_history: Vec<HistoryEntry>,
    /// Ask for a different answer to the same question.
    #[serde(default)]
    pub is_regenerate: bool,
}

/// POST /chat
pub async fn chat(
    State(state): State<AppState>,
    Participant(user): Participant,
    Json(body): Json<ChatBody>,
) -> Result<Response, AppError> {
    let request = ChatRequest {
        message: body.message,
        history: body.conversation_history,
        regenerate: body.is_regenerate,
    };

    let ChatStream {
        frames,
        session_id,
        turn_index,
        duplicate,
        progress,
        persisted: _,
    } = state.chat_service.chat(user.id, request).await?;

    tracing::debug!(
        student_id = %user.student_id,
        session_id = %session_id,
        turn_index,
        duplicate,
        "chat stream opened"
    );

    let body = Body::from_stream(frames.map(Ok::<_, Infallible>));

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-accel-buffering", "no")
        .header("x-session-id", session_id.to_string())
        .header("x-turn-index", turn_index.to_string())
        .header("x-turn-count", progress.turn_count.to_string())
        .body(body)
        .map_err(|e| AppError::Internal(format!("failed to build stream response: {e}")))?;

    if duplicate {
        response
            .headers_mut()
            .insert("x-duplicate-submission", HeaderValue::from_static("true"));
    }

    Ok(response)
}

//! Participant progress HTTP handlers.
//!
//! Endpoints:
//! - GET  /progress                 - Today's turn count and completion
//! - POST /progress                 - Self-reported override of today's progress
//! - GET  /progress/completed-dates - Days with a completed session
//! - GET  /messages                 - Today's message history

use axum::Json;
use axum::extract::State;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use tutorlab_types::message::Message;
use tutorlab_types::session::Progress;

use crate::http::error::AppError;
use crate::http::extractors::auth::Participant;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Body of a self-reported progress update. Missing fields mean zero/false.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SaveProgressBody {
    pub turn_count: u32,
    pub completed: bool,
}

#[derive(Debug, Serialize)]
pub struct CompletedDates {
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct MessageHistory {
    pub messages: Vec<Message>,
}

/// GET /progress
pub async fn get_progress(
    State(state): State<AppState>,
    Participant(user): Participant,
) -> Result<Json<ApiResponse<Progress>>, AppError> {
    let timer = RequestTimer::start();
    let progress = state.progress_service.get_progress(user.id).await?;
    Ok(Json(timer.success(progress).with_link("self", "/progress")))
}

/// POST /progress
///
/// A participant can mark today complete but cannot un-complete it; the
/// stored result is returned.
pub async fn save_progress(
    State(state): State<AppState>,
    Participant(user): Participant,
    Json(body): Json<SaveProgressBody>,
) -> Result<Json<ApiResponse<Progress>>, AppError> {
    let timer = RequestTimer::start();
    let requested = Progress {
        turn_count: body.turn_count,
        completed: body.completed,
    };
    let progress = state.progress_service.save_progress(user.id, requested).await?;
    Ok(Json(timer.success(progress)))
}

/// GET /progress/completed-dates
pub async fn completed_dates(
    State(state): State<AppState>,
    Participant(user): Participant,
) -> Result<Json<ApiResponse<CompletedDates>>, AppError> {
    let timer = RequestTimer::start();
    let dates = state.progress_service.completed_dates(user.id).await?;
    Ok(Json(timer.success(CompletedDates { dates })))
}

/// GET /messages
pub async fn today_messages(
    State(state): State<AppState>,
    Participant(user): Participant,
) -> Result<Json<ApiResponse<MessageHistory>>, AppError> {
    let timer = RequestTimer::start();
    let messages = state.progress_service.today_messages(user.id).await?;
    Ok(Json(timer.success(MessageHistory { messages })))
}

//! Admin HTTP handlers.
//!
//! Endpoints:
//! - GET  /admin/users               - Participants with today's progress
//! - POST /admin/set-progress        - Override a participant's progress for today
//! - POST /admin/set-quota           - Replace a participant's quota columns
//! - POST /admin/trigger-daily-reset - Sweep yesterday now

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use tutorlab_types::session::{Progress, Session, UserProgress};
use tutorlab_types::user::User;

use crate::http::error::AppError;
use crate::http::extractors::auth::AdminOnly;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetProgressBody {
    pub username: String,
    #[serde(default)]
    pub turn_count: u32,
    #[serde(default)]
    pub completed: bool,
}

/// Both columns are replaced; `null` clears one.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetQuotaBody {
    pub username: String,
    #[serde(default)]
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub target_turns: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResult {
    pub target_date: chrono::NaiveDate,
    pub reset_count: u32,
    pub skipped_count: u32,
    pub error_count: u32,
    /// Wall time of the sweep in milliseconds.
    pub elapsed: u64,
}

/// GET /admin/users
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminOnly,
) -> Result<Json<ApiResponse<Vec<UserProgress>>>, AppError> {
    let timer = RequestTimer::start();
    let users = state.progress_service.list_users_with_progress().await?;
    Ok(Json(timer.success(users)))
}

/// POST /admin/set-progress
pub async fn set_progress(
    State(state): State<AppState>,
    AdminOnly(admin): AdminOnly,
    Json(body): Json<SetProgressBody>,
) -> Result<Json<ApiResponse<Session>>, AppError> {
    let timer = RequestTimer::start();
    let student_id = required_username(&body.username)?;
    let progress = Progress {
        turn_count: body.turn_count,
        completed: body.completed,
    };
    let session = state
        .progress_service
        .admin_set_progress(student_id, progress)
        .await?;
    tracing::info!(%admin, student_id, turn_count = progress.turn_count, completed = progress.completed, "progress overridden");
    Ok(Json(timer.success(session)))
}

/// POST /admin/set-quota
pub async fn set_quota(
    State(state): State<AppState>,
    _admin: AdminOnly,
    Json(body): Json<SetQuotaBody>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let timer = RequestTimer::start();
    let student_id = required_username(&body.username)?;
    let user = state
        .progress_service
        .set_quota(student_id, body.max_turns, body.target_turns)
        .await?;
    Ok(Json(timer.success(user)))
}

/// POST /admin/trigger-daily-reset
///
/// Runs the same sweep as the scheduler. A sweep with per-session failures
/// answers 500 but still reports the partial counts.
pub async fn trigger_daily_reset(
    State(state): State<AppState>,
    AdminOnly(admin): AdminOnly,
) -> Result<Response, AppError> {
    let timer = RequestTimer::start();
    tracing::info!(%admin, "manual sweep requested");

    let report = state.scheduler.execute_now().await?;
    let result = ResetResult {
        target_date: report.target_date,
        reset_count: report.reset_count,
        skipped_count: report.skipped_count,
        error_count: report.error_count,
        elapsed: report.elapsed_ms,
    };

    if report.success() {
        return Ok(Json(timer.success(result)).into_response());
    }

    let message = format!("{} session(s) could not be closed", report.error_count);
    let body = timer.success(result).with_error("SWEEP_PARTIAL_FAILURE", &message);
    Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response())
}

fn required_username(username: &str) -> Result<&str, AppError> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("username must not be empty".to_string()));
    }
    Ok(trimmed)
}

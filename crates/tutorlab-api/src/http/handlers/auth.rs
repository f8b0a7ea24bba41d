//! Login, logout, and token verification.
//!
//! Endpoints:
//! - POST /login  - Exchange credentials for a bearer token
//! - POST /logout - Revoke the caller's token
//! - POST /verify - Describe the principal behind a token

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tutorlab_types::error::AuthError;
use tutorlab_types::user::{ExperimentGroup, Principal};

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub principal: Principal,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub revoked: bool,
}

#[derive(Debug, Deserialize)]
pub struct VerifyBody {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub username: String,
    pub is_admin: bool,
    pub group: Option<ExperimentGroup>,
    pub issued_at: Option<DateTime<Utc>>,
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> Result<Json<ApiResponse<LoginResponse>>, AppError> {
    let timer = RequestTimer::start();

    if body.username.trim().is_empty() || body.password.is_empty() {
        return Err(AppError::Validation(
            "Username and password must not be empty".to_string(),
        ));
    }

    let principal = state.auth_service.login(&body.username, &body.password).await?;
    let token = state.tokens.issue(principal.clone());
    tracing::info!(username = principal.username(), admin = principal.is_admin(), "login");

    Ok(Json(timer.success(LoginResponse { token, principal })))
}

/// POST /logout
pub async fn logout(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Json<ApiResponse<LogoutResponse>> {
    let timer = RequestTimer::start();
    let revoked = state.tokens.revoke(&auth.token);
    tracing::info!(username = auth.principal.username(), "logout");
    Json(timer.success(LogoutResponse { revoked }))
}

/// POST /verify
///
/// Takes the token in the body so a client can check a stored token before
/// attaching it to requests.
pub async fn verify(
    State(state): State<AppState>,
    Json(body): Json<VerifyBody>,
) -> Result<Json<ApiResponse<VerifyResponse>>, AppError> {
    let timer = RequestTimer::start();
    let token = body.token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken.into());
    }

    let principal = state.tokens.resolve(token).ok_or(AuthError::InvalidToken)?;
    let response = VerifyResponse {
        username: principal.username().to_string(),
        is_admin: principal.is_admin(),
        group: principal.user().map(|u| u.group),
        issued_at: state.tokens.issued_at(token),
    };
    Ok(Json(timer.success(response)))
}

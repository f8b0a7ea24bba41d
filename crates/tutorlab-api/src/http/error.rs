//! Application error type mapping to HTTP status codes and envelope format.
//!
//! Storage and driver details are logged here and never returned to the
//! caller; the body only carries a machine code and a short message.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use tutorlab_types::error::{
    AuthError, ChatError, DirectoryError, LedgerError, ProgressError, StoreError, SweepError,
};

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    Chat(ChatError),
    Progress(ProgressError),
    Auth(AuthError),
    Sweep(SweepError),
    Store(StoreError),
    /// Authenticated, but the endpoint is not for this kind of principal.
    Forbidden(String),
    /// Validation error.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        AppError::Chat(e)
    }
}

impl From<ProgressError> for AppError {
    fn from(e: ProgressError) -> Self {
        AppError::Progress(e)
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        AppError::Auth(e)
    }
}

impl From<SweepError> for AppError {
    fn from(e: SweepError) -> Self {
        AppError::Sweep(e)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Store(e)
    }
}

type Mapped = (StatusCode, &'static str, String);

fn store_status(e: &StoreError) -> Mapped {
    match e {
        StoreError::Unavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "STORAGE_UNAVAILABLE",
            "Storage is temporarily unavailable".to_string(),
        ),
        StoreError::Timeout { .. } => (
            StatusCode::GATEWAY_TIMEOUT,
            "STORAGE_TIMEOUT",
            "Storage did not respond in time".to_string(),
        ),
        StoreError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", "Not found".to_string()),
        StoreError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT", "Conflicting write".to_string()),
        StoreError::Query(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "STORAGE_ERROR",
            "Storage error".to_string(),
        ),
    }
}

fn ledger_status(e: &LedgerError) -> Mapped {
    match e {
        LedgerError::SessionNotFound(id) => (
            StatusCode::NOT_FOUND,
            "SESSION_NOT_FOUND",
            format!("Session {id} not found"),
        ),
        LedgerError::Store(e) => store_status(e),
    }
}

fn directory_status(e: &DirectoryError) -> Mapped {
    match e {
        DirectoryError::Unresolved { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "SESSION_UNRESOLVED",
            "Today's session could not be resolved".to_string(),
        ),
        DirectoryError::Store(e) => store_status(e),
    }
}

impl AppError {
    fn mapped(&self) -> Mapped {
        match self {
            AppError::Chat(ChatError::EmptyMessage) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "Message must not be empty".to_string(),
            ),
            AppError::Chat(ChatError::UserNotFound(_)) | AppError::Progress(ProgressError::UserNotFound(_)) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Account no longer exists".to_string(),
            ),
            AppError::Chat(ChatError::TurnLimitReached { turn_count, max_turns }) => (
                StatusCode::CONFLICT,
                "TURN_LIMIT_REACHED",
                format!("Daily turn limit reached ({turn_count}/{max_turns})"),
            ),
            AppError::Chat(ChatError::Directory(e)) | AppError::Progress(ProgressError::Directory(e)) => {
                directory_status(e)
            }
            AppError::Chat(ChatError::Ledger(e)) | AppError::Progress(ProgressError::Ledger(e)) => {
                ledger_status(e)
            }
            AppError::Chat(ChatError::Store(e)) | AppError::Progress(ProgressError::Store(e)) => store_status(e),
            AppError::Progress(ProgressError::UnknownStudent(student_id)) => (
                StatusCode::NOT_FOUND,
                "USER_NOT_FOUND",
                format!("Student '{student_id}' not found"),
            ),
            AppError::Auth(AuthError::InvalidCredentials) => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid username or password".to_string(),
            ),
            AppError::Auth(AuthError::MissingToken) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Missing token. Provide it via 'Authorization: Bearer <token>'.".to_string(),
            ),
            AppError::Auth(AuthError::InvalidToken) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Invalid or expired token".to_string(),
            ),
            AppError::Auth(AuthError::Forbidden) => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Admin access required".to_string(),
            ),
            AppError::Auth(AuthError::Store(e)) => store_status(e),
            AppError::Sweep(SweepError::Store(e)) => store_status(e),
            AppError::Sweep(e @ SweepError::UnresolvableEndOfDay(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SWEEP_FAILED",
                e.to_string(),
            ),
            AppError::Store(e) => store_status(e),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone()),
        }
    }

    /// Status code this error maps to.
    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.mapped().0
    }

    /// Machine-readable code this error maps to.
    #[cfg(test)]
    pub fn code(&self) -> &'static str {
        self.mapped().1
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.mapped();
        let request_id = Uuid::now_v7().to_string();

        if status.is_server_error() {
            tracing::error!(%request_id, code, error = ?self, "request failed");
        } else {
            tracing::debug!(%request_id, code, "request rejected");
        }

        (status, Json(ApiResponse::error(code, &message, request_id, 0))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutorlab_types::session::SessionId;

    #[test]
    fn test_turn_limit_maps_to_conflict() {
        let err = AppError::from(ChatError::TurnLimitReached {
            turn_count: 2,
            max_turns: 2,
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "TURN_LIMIT_REACHED");
    }

    #[test]
    fn test_store_errors_do_not_leak_driver_text() {
        let err = AppError::from(ChatError::Store(StoreError::Query(
            "near \"SELEC\": syntax error".to_string(),
        )));
        let (status, code, message) = err.mapped();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "STORAGE_ERROR");
        assert!(!message.contains("SELEC"));
    }

    #[test]
    fn test_storage_timeout_and_unavailable() {
        let timeout = AppError::from(ChatError::Ledger(LedgerError::Store(StoreError::Timeout {
            operation: "recount",
            after_ms: 1000,
        })));
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);

        let down = AppError::from(ProgressError::Store(StoreError::Unavailable("pool closed".to_string())));
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(down.code(), "STORAGE_UNAVAILABLE");
    }

    #[test]
    fn test_session_not_found() {
        let err = AppError::from(ProgressError::Ledger(LedgerError::SessionNotFound(SessionId(9))));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "SESSION_NOT_FOUND");
    }

    #[test]
    fn test_auth_errors() {
        assert_eq!(AppError::from(AuthError::Forbidden).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::from(AuthError::MissingToken).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::from(AuthError::InvalidCredentials).code(),
            "INVALID_CREDENTIALS"
        );
    }
}

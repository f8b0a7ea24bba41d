//! Bearer token authentication extractors.
//!
//! Extracts the token from `Authorization: Bearer <token>` and resolves it
//! against the process-wide [`TokenStore`](crate::token_store::TokenStore).
//!
//! - [`Authenticated`]: any logged-in principal.
//! - [`Participant`]: a student; admins are turned away.
//! - [`AdminOnly`]: the admin account.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use tutorlab_types::error::AuthError;
use tutorlab_types::user::{Principal, User};

use crate::http::error::AppError;
use crate::state::AppState;

/// A resolved bearer token.
pub struct Authenticated {
    pub principal: Principal,
    pub token: String,
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts)?;
        let principal = state.tokens.resolve(&token).ok_or(AuthError::InvalidToken)?;
        Ok(Authenticated { principal, token })
    }
}

/// A logged-in study participant.
pub struct Participant(pub User);

impl FromRequestParts<AppState> for Participant {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = Authenticated::from_request_parts(parts, state).await?;
        match auth.principal {
            Principal::Student { user } => Ok(Participant(user)),
            Principal::Admin { .. } => Err(AppError::Forbidden(
                "This endpoint is only available to participants".to_string(),
            )),
        }
    }
}

/// The admin account. Carries the admin username.
pub struct AdminOnly(pub String);

impl FromRequestParts<AppState> for AdminOnly {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = Authenticated::from_request_parts(parts, state).await?;
        match auth.principal {
            Principal::Admin { username } => Ok(AdminOnly(username)),
            Principal::Student { .. } => Err(AuthError::Forbidden.into()),
        }
    }
}

/// Extract the bearer token from request headers.
pub fn extract_bearer_token(parts: &Parts) -> Result<String, AppError> {
    let Some(auth) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
        return Err(AuthError::MissingToken.into());
    };
    let auth_str = auth
        .to_str()
        .map_err(|_| AppError::Validation("Invalid Authorization header encoding".to_string()))?;
    match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(AuthError::MissingToken.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/progress");
        if let Some(value) = header {
            builder = builder.header("authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token(&parts(Some("Bearer abc123 "))).unwrap(), "abc123");
    }

    #[test]
    fn test_missing_or_malformed_header() {
        for header in [None, Some("Basic dXNlcg=="), Some("Bearer   ")] {
            let err = extract_bearer_token(&parts(header)).err().unwrap();
            assert_eq!(err.code(), "UNAUTHORIZED");
        }
    }
}

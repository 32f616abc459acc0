use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    guard::{GuardDecision, HOME_PATH, SIGN_IN_PATH},
    response::ApiResponse,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Unauthorized {0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Conflict {0}")]
    Conflict(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Error for a guard decision that did not admit the request.
    pub fn denied(decision: GuardDecision) -> Self {
        match decision {
            GuardDecision::DeniedUnauthenticated => {
                AppError::Unauthorized("Sign in required".into())
            }
            GuardDecision::DeniedUnauthorized => AppError::Forbidden,
            GuardDecision::Pending | GuardDecision::Allowed => AppError::Internal(
                anyhow::anyhow!("guard decision {decision:?} is not a denial"),
            ),
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_to: Option<&'static str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, redirect_to) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, None),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, None),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, Some(SIGN_IN_PATH)),
            AppError::Forbidden => (StatusCode::FORBIDDEN, Some(HOME_PATH)),
            AppError::Conflict(_) => (StatusCode::CONFLICT, None),
            AppError::DbError(err) => {
                tracing::error!(error = %err, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
            AppError::OrmError(err) => {
                tracing::error!(error = %err, "orm error");
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };

        let body = ApiResponse::error(
            status.canonical_reason().unwrap_or("Error"),
            ErrorData {
                error: self.to_string(),
                redirect_to,
            },
        );

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_denials_map_to_auth_statuses() {
        let unauthenticated = AppError::denied(GuardDecision::DeniedUnauthenticated);
        assert_eq!(
            unauthenticated.into_response().status(),
            StatusCode::UNAUTHORIZED
        );

        let unauthorized = AppError::denied(GuardDecision::DeniedUnauthorized);
        assert_eq!(unauthorized.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn non_denial_is_an_internal_error() {
        let err = AppError::denied(GuardDecision::Allowed);
        assert!(matches!(err, AppError::Internal(_)));
    }
}

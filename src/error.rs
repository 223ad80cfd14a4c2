use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::handlers::rate_limit_headers;
use crate::rate_limit::RateLimitResult;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Security verification failed")]
    VerificationFailed,

    #[error("{message}")]
    RateLimited {
        message: String,
        limit: u32,
        result: RateLimitResult,
    },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Email already registered")]
    Conflict,

    #[error("Server configuration error")]
    Misconfigured,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn internal(e: impl std::fmt::Display) -> Self {
        AppError::Internal(e.to_string())
    }

    // metric label
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::InvalidEmail => "invalid_email",
            AppError::VerificationFailed => "verification",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::Unauthorized | AppError::InvalidCredentials(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict => "duplicate",
            AppError::Misconfigured | AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) | AppError::InvalidEmail | AppError::VerificationFailed => {
                StatusCode::BAD_REQUEST
            }
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Unauthorized | AppError::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict => StatusCode::CONFLICT,
            AppError::Misconfigured | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match self {
            AppError::RateLimited {
                message,
                limit,
                result,
            } => {
                let body = json!({ "error": message, "retryAfter": result.retry_after_secs });
                let mut response = (status, Json(body)).into_response();
                let headers = response.headers_mut();
                headers.insert(RETRY_AFTER, HeaderValue::from(result.retry_after_secs));
                headers.extend(rate_limit_headers(limit, &result));
                response
            }
            AppError::Internal(msg) => {
                // real cause stays in the logs
                tracing::error!("Internal error: {}", msg);
                (status, Json(json!({ "error": "Internal server error" }))).into_response()
            }
            AppError::Misconfigured => {
                tracing::error!("Request hit an unconfigured feature");
                (status, Json(json!({ "error": "Server configuration error" }))).into_response()
            }
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}

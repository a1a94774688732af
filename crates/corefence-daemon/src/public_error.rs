//! Client-facing error taxonomy. Auth and validation errors carry
//! precise, minimal-leak detail; integrity and sandbox faults are
//! server errors whose detail goes to the log, never to the caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use corefence_core::CoreError;

use crate::auth::AuthError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing bearer credential")]
    AuthMissing,
    #[error("invalid token")]
    AuthInvalid,
    #[error("missing X-Timestamp and/or X-Signature")]
    SignatureMissing,
    #[error("invalid X-Timestamp")]
    TimestampInvalid,
    #[error("X-Timestamp outside allowed skew")]
    TimestampOutOfSkew,
    #[error("invalid X-Signature")]
    SignatureInvalid,
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("{0} out of range")]
    Range(&'static str),
    #[error("{0}")]
    Schema(String),
    #[error("core integrity failure: {0}")]
    Integrity(String),
    #[error("write path misconfigured: {0}")]
    Sandbox(String),
    #[error("corrupt log: {0}")]
    CorruptLog(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AuthMissing => "AUTH_MISSING",
            Self::AuthInvalid => "AUTH_INVALID",
            Self::SignatureMissing => "SIGNATURE_MISSING",
            Self::TimestampInvalid | Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::TimestampOutOfSkew => "TIMESTAMP_SKEW",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Range(_) => "RANGE",
            Self::Schema(_) => "SCHEMA",
            Self::Integrity(_) => "INTEGRITY",
            Self::Sandbox(_) => "SANDBOX_VIOLATION",
            Self::CorruptLog(_) => "PARSE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::AuthMissing
            | Self::SignatureMissing
            | Self::TimestampInvalid
            | Self::TimestampOutOfSkew
            | Self::SignatureInvalid => StatusCode::UNAUTHORIZED,
            Self::AuthInvalid => StatusCode::FORBIDDEN,
            Self::InvalidInput(_) | Self::Range(_) | Self::Schema(_) => StatusCode::BAD_REQUEST,
            Self::Integrity(_) | Self::Sandbox(_) | Self::CorruptLog(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let detail = if status.is_server_error() {
            // Tampering or a deployment bug: loud in the log, terse on
            // the wire.
            tracing::error!(code, detail = %self, "server fault");
            "internal error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": code, "detail": detail }))).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredential => Self::AuthMissing,
            AuthError::InvalidToken => Self::AuthInvalid,
            AuthError::MissingSignature => Self::SignatureMissing,
            AuthError::InvalidTimestamp => Self::TimestampInvalid,
            AuthError::TimestampOutOfSkew => Self::TimestampOutOfSkew,
            AuthError::InvalidSignature => Self::SignatureInvalid,
            AuthError::SecretNotConfigured => {
                Self::Internal("HMAC required but secret not configured".to_string())
            }
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::SandboxViolation(detail) => Self::Sandbox(detail),
            CoreError::Integrity(detail) => Self::Integrity(detail),
            CoreError::Schema(detail) => Self::Schema(detail),
            parse @ CoreError::Parse { .. } => Self::CorruptLog(parse.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_map_to_expected_statuses() {
        assert_eq!(
            ApiError::from(AuthError::MissingCredential).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::InvalidToken).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AuthError::InvalidSignature).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::SecretNotConfigured).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn sandbox_and_integrity_are_server_faults() {
        let sandbox = ApiError::from(CoreError::SandboxViolation("x".to_string()));
        assert_eq!(sandbox.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(sandbox.code(), "SANDBOX_VIOLATION");

        let integrity = ApiError::from(CoreError::Integrity("x".to_string()));
        assert_eq!(integrity.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(integrity.code(), "INTEGRITY");
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::fmt::Display;

use crate::services::mqtt::DispatchError;
use crate::store::StoreError;

/// One rejected request parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::default();
        err.push(field, message);
        err
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .issues
            .iter()
            .map(|issue| format!("{}: {}", issue.field, issue.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationIssue>>,
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<Vec<ValidationIssue>>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn validation(err: ValidationError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: "Validation failed".to_string(),
            details: Some(err.issues),
        }
    }

    pub fn bad_request(field: &str, message: impl Into<String>) -> Self {
        Self::validation(ValidationError::single(field, message))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    /// Internal failures only echo the underlying error outside production.
    pub fn internal(err: impl Display, expose_details: bool) -> Self {
        tracing::error!(error = %err, "internal error");
        let message = if expose_details {
            format!("Internal server error: {err}")
        } else {
            "Internal server error".to_string()
        };
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn from_store(err: StoreError, expose_details: bool) -> Self {
        match err {
            StoreError::Unreachable(_) | StoreError::Timeout(_) => {
                tracing::warn!(error = %err, "time-series store unavailable");
                Self::unavailable("Time-series store is unavailable")
            }
            StoreError::Query(_) => Self::internal(err, expose_details),
        }
    }

    pub fn from_dispatch(err: DispatchError, expose_details: bool) -> Self {
        match err {
            DispatchError::NotConnected => Self::unavailable("Message broker is not connected"),
            DispatchError::Client(_) | DispatchError::Encode(_) => {
                Self::internal(err, expose_details)
            }
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::validation(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_connection_failures_map_to_service_unavailable() {
        let err = AppError::from_store(StoreError::Unreachable("refused".into()), false);
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        let err = AppError::from_store(StoreError::Timeout(8_000), false);
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn internal_errors_hide_details_in_production() {
        let err = AppError::from_store(StoreError::Query("syntax error".into()), false);
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("syntax"));

        let err = AppError::from_store(StoreError::Query("syntax error".into()), true);
        assert!(err.message.contains("syntax"));
    }

    #[test]
    fn validation_errors_carry_field_details() {
        let mut issues = ValidationError::default();
        issues.push("startTime", "bad");
        let err = AppError::from(issues);
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.details.as_ref().map(Vec::len), Some(1));
    }
}

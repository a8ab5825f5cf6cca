//! Error handling module for the Jeevan Aahar backend.
//!
//! Provides centralized error types with mapping to HTTP status codes and response envelopes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const ROLE_REQUIRED: &str = "ROLE_REQUIRED";
    pub const PROFILE_EXISTS: &str = "PROFILE_EXISTS";
    pub const PROFILE_CREATION_CONFLICT: &str = "PROFILE_CREATION_CONFLICT";
    pub const PROFILE_INCOMPLETE: &str = "PROFILE_INCOMPLETE";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const READ_ONLY_FIELD: &str = "READ_ONLY_FIELD";
    pub const NO_FIELDS_PROVIDED: &str = "NO_FIELDS_PROVIDED";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Message served in place of internal detail when it must not leak.
const HIDDEN_INTERNAL_MESSAGE: &str = "Internal server error";

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Missing, invalid or expired credential
    Unauthenticated(String),
    /// First contact without a usable role under the require-role policy
    RoleRequired,
    /// A profile already exists for this identity
    DuplicateProfile,
    /// A concurrent request created the profile first
    ProfileCreationConflict,
    /// The profile has not been completed yet
    ProfileIncomplete,
    /// The account's role does not allow the action
    Forbidden(String),
    /// Resource not found
    NotFound(String),
    /// An update tried to set identity fields
    ReadOnlyFieldRejected(Vec<String>),
    /// An update named no editable field
    NoFieldsProvided,
    /// Validation error
    Validation(String),
    /// Undecodable request payload
    BadRequest(String),
    /// Database error
    Database(String),
    /// Internal server error
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::RoleRequired => StatusCode::NOT_FOUND,
            AppError::DuplicateProfile => StatusCode::CONFLICT,
            AppError::ProfileCreationConflict => StatusCode::CONFLICT,
            AppError::ProfileIncomplete => StatusCode::FORBIDDEN,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ReadOnlyFieldRejected(_) => StatusCode::BAD_REQUEST,
            AppError::NoFieldsProvided => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => codes::UNAUTHENTICATED,
            AppError::RoleRequired => codes::ROLE_REQUIRED,
            AppError::DuplicateProfile => codes::PROFILE_EXISTS,
            AppError::ProfileCreationConflict => codes::PROFILE_CREATION_CONFLICT,
            AppError::ProfileIncomplete => codes::PROFILE_INCOMPLETE,
            AppError::Forbidden(_) => codes::FORBIDDEN,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::ReadOnlyFieldRejected(_) => codes::READ_ONLY_FIELD,
            AppError::NoFieldsProvided => codes::NO_FIELDS_PROVIDED,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::BadRequest(_) => codes::BAD_REQUEST,
            AppError::Database(_) => codes::DATABASE_ERROR,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Unauthenticated(msg) => msg.clone(),
            AppError::RoleRequired => {
                "Profile not found. Please select a role to complete signup.".to_string()
            }
            AppError::DuplicateProfile => "Profile already exists for this user".to_string(),
            AppError::ProfileCreationConflict => {
                "Profile was created by a concurrent request. Please retry.".to_string()
            }
            AppError::ProfileIncomplete => {
                "Profile completion required to access this resource".to_string()
            }
            AppError::Forbidden(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::ReadOnlyFieldRejected(fields) => {
                format!("Cannot update read-only fields: {}", fields.join(", "))
            }
            AppError::NoFieldsProvided => "No fields to update. Provide at least one of: phone, address, latitude, longitude, avatar, landmark".to_string(),
            AppError::Validation(msg) => msg.clone(),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::Database(msg) => msg.clone(),
            AppError::Internal(msg) => msg.clone(),
        }
    }

    /// Whether the message may carry internal detail.
    pub fn is_internal(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AppError::Database(format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::debug!("JSON error: {:?}", err);
        AppError::BadRequest(format!("Invalid request body: {}", err))
    }
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status_code: u16,
    pub data: Option<serde_json::Value>,
    pub message: String,
    pub success: bool,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_role: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

impl ErrorResponse {
    pub fn new(error: &AppError, expose_internal: bool) -> Self {
        let message = if error.is_internal() && !expose_internal {
            HIDDEN_INTERNAL_MESSAGE.to_string()
        } else {
            error.message()
        };

        Self {
            status_code: error.status_code().as_u16(),
            data: None,
            message,
            success: false,
            code: error.error_code().to_string(),
            requires_role: matches!(error, AppError::RoleRequired).then_some(true),
            is_completed: matches!(error, AppError::ProfileIncomplete).then_some(false),
            fields: match error {
                AppError::ReadOnlyFieldRejected(fields) => Some(fields.clone()),
                _ => None,
            },
        }
    }
}

/// An error bound for the wire, carrying whether internal detail may be shown.
#[derive(Debug)]
pub struct ApiError {
    pub error: AppError,
    pub expose_internal: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.error.is_internal() {
            tracing::error!(code = self.error.error_code(), "{}", self.error.message());
        }
        let status = self.error.status_code();
        let body = ErrorResponse::new(&self.error, self.expose_internal);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Unauthenticated("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::RoleRequired.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::DuplicateProfile.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::ProfileCreationConflict.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::ProfileIncomplete.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::ReadOnlyFieldRejected(vec![]).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Database("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_envelope_flags() {
        let body = ErrorResponse::new(&AppError::RoleRequired, false);
        assert_eq!(body.requires_role, Some(true));
        assert_eq!(body.is_completed, None);
        assert_eq!(body.status_code, 404);
        assert!(!body.success);

        let body = ErrorResponse::new(&AppError::ProfileIncomplete, false);
        assert_eq!(body.is_completed, Some(false));
        assert_eq!(body.requires_role, None);

        let body = ErrorResponse::new(
            &AppError::ReadOnlyFieldRejected(vec!["email".into(), "role".into()]),
            false,
        );
        assert_eq!(body.fields, Some(vec!["email".to_string(), "role".to_string()]));
        assert_eq!(body.message, "Cannot update read-only fields: email, role");
    }

    #[test]
    fn test_internal_detail_hidden_unless_exposed() {
        let err = AppError::Database("Database error: disk I/O".into());
        assert_eq!(ErrorResponse::new(&err, false).message, HIDDEN_INTERNAL_MESSAGE);
        assert_eq!(
            ErrorResponse::new(&err, true).message,
            "Database error: disk I/O"
        );

        let err = AppError::Validation("name is required".into());
        assert_eq!(ErrorResponse::new(&err, false).message, "name is required");
    }

    #[test]
    fn test_envelope_serializes_camel_case() {
        let value = serde_json::to_value(ErrorResponse::new(&AppError::RoleRequired, false)).unwrap();
        assert_eq!(value["statusCode"], 404);
        assert_eq!(value["requiresRole"], true);
        assert!(value["data"].is_null());
        assert!(value.get("isCompleted").is_none());
    }
}

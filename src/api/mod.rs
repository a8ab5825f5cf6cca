//! REST API module.
//!
//! Contains all API routes and handlers following the frontend contract.

mod auth;
mod donation;
mod profile;

pub use auth::*;
pub use donation::*;
pub use profile::*;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::{ApiError, AppError};
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub status_code: u16,
    pub data: T,
    pub message: String,
    pub success: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status: StatusCode, data: T, message: impl Into<String>) -> Self {
        Self {
            status_code: status.as_u16(),
            data,
            message: message.into(),
            success: true,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

/// JSON body extractor whose rejections use the error envelope.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(status = %rejection.status(), "Rejected request body");
                Err(ApiError {
                    error: AppError::BadRequest(rejection.body_text()),
                    expose_internal: false,
                })
            }
        }
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

/// Create a 200 response.
pub fn ok<T: Serialize>(data: T, message: &str) -> ApiResult<T> {
    Ok(ApiResponse::new(StatusCode::OK, data, message))
}

/// Create a 201 response.
pub fn created<T: Serialize>(data: T, message: &str) -> ApiResult<T> {
    Ok(ApiResponse::new(StatusCode::CREATED, data, message))
}

/// Create an error API response.
pub fn error<T: Serialize>(state: &AppState, err: AppError) -> ApiResult<T> {
    Err(state.reject(err))
}

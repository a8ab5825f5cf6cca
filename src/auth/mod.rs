//! Bearer credential verification and the profile gates built on it.

mod firebase;
mod gate;

pub use firebase::*;
pub use gate::*;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::AppError;

/// A verified identity, produced once per request and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityClaim {
    /// Stable subject id issued by the identity provider
    pub external_id: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Reasons a credential can be refused.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("no bearer credential provided")]
    MissingCredential,

    #[error("credential expired")]
    ExpiredCredential,

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("identity verifier unavailable: {0}")]
    Unavailable(String),
}

impl From<VerifyError> for AppError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::MissingCredential => {
                AppError::Unauthenticated("No authentication token provided".to_string())
            }
            VerifyError::ExpiredCredential => {
                tracing::warn!("Expired credential presented");
                AppError::Unauthenticated(
                    "Authentication token expired. Please sign in again.".to_string(),
                )
            }
            VerifyError::InvalidCredential(reason) => {
                tracing::warn!(%reason, "Authentication failed");
                AppError::Unauthenticated("Authentication failed".to_string())
            }
            VerifyError::Unavailable(reason) => AppError::Internal(reason),
        }
    }
}

/// Turns an opaque bearer credential into a verified identity.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify `credential` and return the identity it proves.
    async fn verify(&self, credential: &str) -> Result<IdentityClaim, VerifyError>;
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, VerifyError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(VerifyError::MissingCredential)
}

//! Signup endpoint.

use axum::{extract::State, Extension};
use serde_json::Value;

use super::{created, error, ApiJson, ApiResult};
use crate::auth::IdentityClaim;
use crate::errors::AppError;
use crate::models::{NewProfile, Profile, Role, SignupRequest};
use crate::AppState;

/// POST /api/v1/auth/signup - Create the caller's profile with a chosen role.
pub async fn signup(
    State(state): State<AppState>,
    Extension(claim): Extension<IdentityClaim>,
    ApiJson(payload): ApiJson<Value>,
) -> ApiResult<Profile> {
    match register(&state, &claim, payload).await {
        Ok(profile) => {
            tracing::info!(uid = %profile.uid, role = %profile.role, "Profile created at signup");
            created(profile, "Signup successful")
        }
        Err(e) => error(&state, e),
    }
}

async fn register(
    state: &AppState,
    claim: &IdentityClaim,
    payload: Value,
) -> Result<Profile, AppError> {
    let request: SignupRequest = serde_json::from_value(payload)?;

    let (Some(name), Some(role)) = (
        request.name.filter(|n| !n.trim().is_empty()),
        request.role.filter(|r| !r.trim().is_empty()),
    ) else {
        return Err(AppError::Validation(
            "Name and role are required".to_string(),
        ));
    };

    let role = role.parse::<Role>().map_err(|_| {
        AppError::Validation("Invalid role. Must be 'donor' or 'recipient'".to_string())
    })?;

    if state
        .repo
        .find_profile_by_uid(&claim.external_id)
        .await?
        .is_some()
    {
        return Err(AppError::DuplicateProfile);
    }

    state
        .repo
        .create_profile(&NewProfile {
            uid: claim.external_id.clone(),
            email: claim.email.clone(),
            name: name.trim().to_string(),
            role,
        })
        .await
}

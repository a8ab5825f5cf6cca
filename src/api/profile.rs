//! Profile API endpoints.

use axum::{
    extract::{Path, State},
    Extension,
};
use serde_json::Value;

use super::{error, ok, ApiJson, ApiResult};
use crate::errors::AppError;
use crate::models::{read_only_fields_in, Profile, PublicProfile, UpdateProfileRequest};
use crate::AppState;

/// GET /api/v1/profile - The caller's own profile.
pub async fn get_profile(Extension(profile): Extension<Profile>) -> ApiResult<Profile> {
    ok(profile, "Profile retrieved successfully")
}

/// PATCH /api/v1/profile - Update the editable profile fields.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(profile): Extension<Profile>,
    ApiJson(payload): ApiJson<Value>,
) -> ApiResult<Profile> {
    match apply_update(&state, profile, payload).await {
        Ok(profile) => ok(profile, "Profile updated successfully"),
        Err(e) => error(&state, e),
    }
}

async fn apply_update(
    state: &AppState,
    profile: Profile,
    payload: Value,
) -> Result<Profile, AppError> {
    let Some(fields) = payload.as_object() else {
        return Err(AppError::BadRequest(
            "Request body must be a JSON object".to_string(),
        ));
    };

    // Checked on the raw payload so identity fields cannot slip through
    let read_only = read_only_fields_in(fields);
    if !read_only.is_empty() {
        return Err(AppError::ReadOnlyFieldRejected(read_only));
    }

    let changes: UpdateProfileRequest = serde_json::from_value(payload)?;
    if changes.is_empty() {
        return Err(AppError::NoFieldsProvided);
    }
    changes.validate().map_err(AppError::Validation)?;

    let updated = state.repo.update_profile(&profile.id, changes).await?;
    tracing::debug!(uid = %updated.uid, completed = updated.is_completed, "Profile updated");
    Ok(updated)
}

/// GET /api/v1/profile/{uid} - Public view of any profile.
pub async fn get_public_profile(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> ApiResult<PublicProfile> {
    match state.repo.find_profile_by_uid(&uid).await {
        Ok(Some(profile)) => ok(profile.into(), "User profile retrieved successfully"),
        Ok(None) => error(
            &state,
            AppError::NotFound("User profile not found".to_string()),
        ),
        Err(e) => error(&state, e),
    }
}

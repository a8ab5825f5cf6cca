//! Donation API endpoints.

use axum::{extract::State, Extension};
use serde_json::Value;

use super::{created, error, ok, ApiJson, ApiResult};
use crate::errors::AppError;
use crate::models::{CreateDonationRequest, Donation, Profile};
use crate::AppState;

/// GET /api/v1/donation - All donations, most recent first.
pub async fn list_donations(State(state): State<AppState>) -> ApiResult<Vec<Donation>> {
    match state.repo.list_donations().await {
        Ok(donations) => ok(donations, "Donations fetched successfully"),
        Err(e) => error(&state, e),
    }
}

/// POST /api/v1/donation - Publish a donation as the authenticated donor.
pub async fn create_donation(
    State(state): State<AppState>,
    Extension(donor): Extension<Profile>,
    ApiJson(payload): ApiJson<Value>,
) -> ApiResult<Donation> {
    match publish(&state, &donor, payload).await {
        Ok(donation) => {
            tracing::info!(donation = %donation.id, donor = %donor.uid, "Donation created");
            created(donation, "Donation created successfully")
        }
        Err(e) => error(&state, e),
    }
}

async fn publish(state: &AppState, donor: &Profile, payload: Value) -> Result<Donation, AppError> {
    let request: CreateDonationRequest = serde_json::from_value(payload)?;
    let donation = request
        .into_new_donation(donor)
        .map_err(AppError::Validation)?;
    state.repo.create_donation(&donation).await
}

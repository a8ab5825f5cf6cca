//! Request gates: credential verification, profile resolution, completion and role checks.
//!
//! Layer order on a route is fixed: `resolve_profile` first, then
//! `require_completed_profile`, then `require_donor`. The later gates read
//! the profile the first one attached.

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;

use super::{bearer_token, IdentityClaim};
use crate::config::FirstContactPolicy;
use crate::errors::AppError;
use crate::models::{NewProfile, Profile, Role};
use crate::AppState;

/// Name given to a first-contact profile when the identity carries none.
const FALLBACK_NAME: &str = "User";

#[derive(Debug, Deserialize)]
struct RoleQuery {
    role: Option<String>,
}

impl FirstContactPolicy {
    /// Pick the role for a profile created on first contact.
    pub fn resolve_role(&self, supplied: Option<Role>) -> Result<Role, AppError> {
        match (supplied, self) {
            (Some(role), _) => Ok(role),
            (None, FirstContactPolicy::RequireRole) => Err(AppError::RoleRequired),
            (None, FirstContactPolicy::DefaultRole(role)) => Ok(*role),
        }
    }
}

/// Verify the bearer credential only; attaches the `IdentityClaim`.
pub async fn verify_credential(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match verify(&state, request.headers()).await {
        Ok(claim) => {
            request.extensions_mut().insert(claim);
            next.run(request).await
        }
        Err(error) => state.reject(error).into_response(),
    }
}

/// Verify the credential, then load or create the caller's profile.
///
/// Attaches both the `IdentityClaim` and the `Profile` to the request.
pub async fn resolve_profile(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match attach_profile(&state, request).await {
        Ok(request) => next.run(request).await,
        Err(error) => state.reject(error).into_response(),
    }
}

/// Let the request through only when the attached profile is completed.
pub async fn require_completed_profile(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let verdict = check_completed(request.extensions().get::<Profile>());
    match verdict {
        Ok(()) => next.run(request).await,
        Err(error) => state.reject(error).into_response(),
    }
}

/// Let the request through only when the attached profile may publish donations.
pub async fn require_donor(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let verdict = check_can_donate(request.extensions().get::<Profile>());
    match verdict {
        Ok(()) => next.run(request).await,
        Err(error) => state.reject(error).into_response(),
    }
}

/// Completion predicate over the resolved profile.
pub fn check_completed(profile: Option<&Profile>) -> Result<(), AppError> {
    match profile {
        None => Err(AppError::Unauthenticated(
            "Authentication required".to_string(),
        )),
        Some(profile) if !profile.is_completed => Err(AppError::ProfileIncomplete),
        Some(_) => Ok(()),
    }
}

/// Role predicate for publishing donations.
pub fn check_can_donate(profile: Option<&Profile>) -> Result<(), AppError> {
    match profile {
        None => Err(AppError::Unauthenticated(
            "Authentication required".to_string(),
        )),
        Some(profile) if !profile.role.can_donate() => Err(AppError::Forbidden(format!(
            "Access allowed only for donors; this account is a {}",
            profile.role
        ))),
        Some(_) => Ok(()),
    }
}

async fn verify(state: &AppState, headers: &HeaderMap) -> Result<IdentityClaim, AppError> {
    let token = bearer_token(headers)?;
    Ok(state.verifier.verify(token).await?)
}

async fn attach_profile(state: &AppState, mut request: Request) -> Result<Request, AppError> {
    let claim = verify(state, request.headers()).await?;

    let profile = match state.repo.find_profile_by_uid(&claim.external_id).await? {
        Some(profile) => profile,
        None => {
            let (supplied, buffered) = requested_role(request, state.config.body_limit).await?;
            request = buffered;
            let role = state.config.first_contact.resolve_role(supplied)?;
            create_on_first_contact(state, &claim, role).await?
        }
    };

    request.extensions_mut().insert(claim);
    request.extensions_mut().insert(profile);
    Ok(request)
}

async fn create_on_first_contact(
    state: &AppState,
    claim: &IdentityClaim,
    role: Role,
) -> Result<Profile, AppError> {
    let profile = state
        .repo
        .create_profile(&new_profile_for(claim, role))
        .await
        .map_err(|e| match e {
            AppError::DuplicateProfile => {
                tracing::warn!(uid = %claim.external_id, "Concurrent first-contact profile creation");
                AppError::ProfileCreationConflict
            }
            other => other,
        })?;

    tracing::info!(uid = %profile.uid, role = %profile.role, "Created profile on first contact");
    Ok(profile)
}

/// Profile fields for an identity seen for the first time.
pub fn new_profile_for(claim: &IdentityClaim, role: Role) -> NewProfile {
    let name = claim
        .display_name
        .clone()
        .or_else(|| {
            claim
                .email
                .split('@')
                .next()
                .filter(|local| !local.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| FALLBACK_NAME.to_string());

    NewProfile {
        uid: claim.external_id.clone(),
        email: claim.email.clone(),
        name,
        role,
    }
}

/// The role a first-contact request asks for: `?role=` first, then a JSON body `role`.
///
/// Reading the body consumes it, so the request is rebuilt from the buffered bytes.
async fn requested_role(request: Request, limit: usize) -> Result<(Option<Role>, Request), AppError> {
    let from_query = Query::<RoleQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(q)| q.role)
        .and_then(|raw| parse_role(&raw));
    if from_query.is_some() {
        return Ok((from_query, request));
    }

    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if !is_json {
        return Ok((None, request));
    }

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read request body: {}", e)))?;

    let from_body = serde_json::from_slice::<Value>(&bytes)
        .ok()
        .as_ref()
        .and_then(|v| v.get("role"))
        .and_then(Value::as_str)
        .and_then(parse_role);

    Ok((from_body, Request::from_parts(parts, Body::from(bytes))))
}

fn parse_role(raw: &str) -> Option<Role> {
    match raw.parse::<Role>() {
        Ok(role) => Some(role),
        Err(e) => {
            tracing::warn!("Ignoring requested role: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(display_name: Option<&str>, email: &str) -> IdentityClaim {
        IdentityClaim {
            external_id: "uid-1".to_string(),
            email: email.to_string(),
            display_name: display_name.map(str::to_string),
        }
    }

    fn profile(role: Role, is_completed: bool) -> Profile {
        Profile {
            id: "p-1".to_string(),
            uid: "uid-1".to_string(),
            email: "a@example.com".to_string(),
            name: "A".to_string(),
            role,
            phone: None,
            address: None,
            landmark: None,
            latitude: None,
            longitude: None,
            avatar: None,
            is_completed,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_require_role_policy() {
        let policy = FirstContactPolicy::RequireRole;
        assert!(matches!(policy.resolve_role(None), Err(AppError::RoleRequired)));
        assert_eq!(policy.resolve_role(Some(Role::Recipient)).unwrap(), Role::Recipient);
    }

    #[test]
    fn test_default_role_policy() {
        let policy = FirstContactPolicy::DefaultRole(Role::Donor);
        assert_eq!(policy.resolve_role(None).unwrap(), Role::Donor);
        assert_eq!(policy.resolve_role(Some(Role::Recipient)).unwrap(), Role::Recipient);
    }

    #[test]
    fn test_completion_predicate() {
        assert!(matches!(
            check_completed(None),
            Err(AppError::Unauthenticated(_))
        ));
        assert!(matches!(
            check_completed(Some(&profile(Role::Donor, false))),
            Err(AppError::ProfileIncomplete)
        ));
        assert!(check_completed(Some(&profile(Role::Donor, true))).is_ok());
    }

    #[test]
    fn test_donor_predicate() {
        assert!(check_can_donate(Some(&profile(Role::Donor, true))).is_ok());
        assert!(matches!(
            check_can_donate(Some(&profile(Role::Recipient, true))),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            check_can_donate(None),
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_first_contact_name_fallbacks() {
        let new = new_profile_for(&claim(Some("Asha Rao"), "asha@example.com"), Role::Donor);
        assert_eq!(new.name, "Asha Rao");
        assert_eq!(new.email, "asha@example.com");
        assert_eq!(new.uid, "uid-1");

        let new = new_profile_for(&claim(None, "asha@example.com"), Role::Donor);
        assert_eq!(new.name, "asha");

        let new = new_profile_for(&claim(None, "@example.com"), Role::Recipient);
        assert_eq!(new.name, FALLBACK_NAME);
        assert_eq!(new.role, Role::Recipient);
    }

    #[tokio::test]
    async fn test_requested_role_prefers_query() {
        let request = Request::builder()
            .uri("/api/v1/profile?role=recipient")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"role":"donor"}"#))
            .unwrap();
        let (role, _) = requested_role(request, 1024).await.unwrap();
        assert_eq!(role, Some(Role::Recipient));
    }

    #[tokio::test]
    async fn test_requested_role_from_body_keeps_body() {
        let request = Request::builder()
            .uri("/api/v1/profile")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"role":"donor","phone":"555"}"#))
            .unwrap();
        let (role, request) = requested_role(request, 1024).await.unwrap();
        assert_eq!(role, Some(Role::Donor));

        let bytes = axum::body::to_bytes(request.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], br#"{"role":"donor","phone":"555"}"#);
    }

    #[tokio::test]
    async fn test_unknown_requested_role_is_ignored() {
        let request = Request::builder()
            .uri("/api/v1/profile?role=admin")
            .body(Body::empty())
            .unwrap();
        let (role, _) = requested_role(request, 1024).await.unwrap();
        assert_eq!(role, None);
    }
}

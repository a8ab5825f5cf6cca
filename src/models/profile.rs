//! Profile model matching the frontend UserProfile interface.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::Role;

/// Payload keys that identify the account and can never be changed by an update.
pub const READ_ONLY_FIELDS: &[&str] = &["uid", "externalId", "name", "email", "role"];

/// A user profile, one per verified identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(rename = "_id")]
    pub id: String,
    /// Identity provider subject id
    pub uid: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmark: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub is_completed: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields needed to create a profile on first contact or signup.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub uid: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

/// Request body for `POST /api/v1/auth/signup`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// The subset of a profile served to unauthenticated callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub uid: String,
    pub name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub landmark: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub avatar: Option<String>,
}

impl From<Profile> for PublicProfile {
    fn from(profile: Profile) -> Self {
        Self {
            uid: profile.uid,
            name: profile.name,
            role: profile.role,
            phone: profile.phone,
            address: profile.address,
            landmark: profile.landmark,
            latitude: profile.latitude,
            longitude: profile.longitude,
            avatar: profile.avatar,
        }
    }
}

/// Request body for `PATCH /api/v1/profile`.
///
/// Each field has three states: absent (`None`, left untouched), `null`
/// (`Some(None)`, cleared) and a value (`Some(Some(_))`, set).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub landmark: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub latitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub longitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub avatar: Option<Option<String>>,
}

impl UpdateProfileRequest {
    /// True when none of the editable fields was mentioned.
    pub fn is_empty(&self) -> bool {
        self.phone.is_none()
            && self.address.is_none()
            && self.landmark.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.avatar.is_none()
    }

    /// Check coordinate ranges, returning a message for the first bad value.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(Some(lat)) = self.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                return Err("latitude must be between -90 and 90".to_string());
            }
        }
        if let Some(Some(lng)) = self.longitude {
            if !(-180.0..=180.0).contains(&lng) {
                return Err("longitude must be between -180 and 180".to_string());
            }
        }
        Ok(())
    }
}

/// Names of read-only keys present in a raw update payload, in declaration order.
pub fn read_only_fields_in(payload: &Map<String, Value>) -> Vec<String> {
    READ_ONLY_FIELDS
        .iter()
        .filter(|field| payload.contains_key(**field))
        .map(|field| field.to_string())
        .collect()
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

//! Donation listing model matching the frontend DonationResponse interface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Profile;

/// A published donation listing. Listings are immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub food_type: String,
    pub quantity: i64,
    pub email: String,
    pub phone: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmark: Option<String>,
    pub prepared_at: String,
    pub pickup_date: String,
    pub pickup_time: String,
    pub picture: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_note: Option<String>,
    /// Internal id of the owning profile
    pub donor: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating a donation.
///
/// Has no `email`, `phone` or `address`; those come from the donor's profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDonationRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub food_type: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub prepared_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pickup_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pickup_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub landmark: Option<String>,
    #[serde(default)]
    pub additional_note: Option<String>,
}

/// A validated donation ready to be stored.
#[derive(Debug, Clone)]
pub struct NewDonation {
    pub name: String,
    pub food_type: String,
    pub quantity: i64,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub landmark: Option<String>,
    pub prepared_at: DateTime<Utc>,
    pub pickup_date: DateTime<Utc>,
    pub pickup_time: DateTime<Utc>,
    pub picture: String,
    pub additional_note: Option<String>,
    pub donor: String,
}

impl CreateDonationRequest {
    /// Validate the request and bind it to `donor`.
    ///
    /// Required fields are checked in a fixed order; the first missing one is reported.
    pub fn into_new_donation(self, donor: &Profile) -> Result<NewDonation, String> {
        let name = required_text(self.name, "name")?;
        let food_type = required_text(self.food_type, "foodType")?;
        let quantity = self.quantity.ok_or_else(|| missing("quantity"))?;
        let prepared_at = self.prepared_at.ok_or_else(|| missing("preparedAt"))?;
        let pickup_date = self.pickup_date.ok_or_else(|| missing("pickupDate"))?;
        let pickup_time = self.pickup_time.ok_or_else(|| missing("pickupTime"))?;
        let picture = required_text(self.picture, "picture")?;

        if quantity <= 0 {
            return Err("quantity must be a positive integer".to_string());
        }

        let (email, phone, address) = contact_of(donor)?;
        let landmark = non_blank(self.landmark).or_else(|| donor.landmark.clone());

        Ok(NewDonation {
            name,
            food_type,
            quantity,
            email,
            phone,
            address,
            landmark,
            prepared_at,
            pickup_date,
            pickup_time,
            picture,
            additional_note: non_blank(self.additional_note),
            donor: donor.id.clone(),
        })
    }
}

/// A completed profile always has phone and address, but completion is sticky
/// and those fields can be cleared afterwards.
fn contact_of(donor: &Profile) -> Result<(String, String, String), String> {
    let phone = non_blank(donor.phone.clone())
        .ok_or_else(|| "profile phone is required to publish a donation".to_string())?;
    let address = non_blank(donor.address.clone())
        .ok_or_else(|| "profile address is required to publish a donation".to_string())?;
    Ok((donor.email.clone(), phone, address))
}

fn required_text(value: Option<String>, field: &str) -> Result<String, String> {
    non_blank(value).ok_or_else(|| missing(field))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn missing(field: &str) -> String {
    format!("{} is required", field)
}

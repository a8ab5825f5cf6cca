//! Data models for the Jeevan Aahar backend.
//!
//! These models match the frontend TypeScript interfaces so responses can be consumed unchanged.

mod donation;
mod profile;
mod role;

pub use donation::*;
pub use profile::*;
pub use role::*;

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp the way it is stored and served.
///
/// Fixed-width millisecond precision keeps stored values lexically ordered.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

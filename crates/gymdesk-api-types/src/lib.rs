//! Wire types for the gym management REST API.
//!
//! Every remote resource has an explicit request/response type here so that
//! responses are parsed and validated at the client boundary rather than being
//! passed around as loose JSON.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DayOfWeek::Monday => "monday",
            DayOfWeek::Tuesday => "tuesday",
            DayOfWeek::Wednesday => "wednesday",
            DayOfWeek::Thursday => "thursday",
            DayOfWeek::Friday => "friday",
            DayOfWeek::Saturday => "saturday",
            DayOfWeek::Sunday => "sunday",
        }
    }
}

/// A recurring weekly time window during which a coach can be booked at a gym.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub gym_id: String,
    pub day_of_week: DayOfWeek,
    /// `HH:MM`, 24 hour clock.
    pub start_time: String,
    /// `HH:MM`, 24 hour clock.
    pub end_time: String,
}

/// Payload accepted by `POST /coaches/me/availability`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SetAvailabilityRequest {
    pub gym_id: String,
    pub day_of_week: DayOfWeek,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevenuePeriod {
    Week,
    Month,
    Year,
}

impl RevenuePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevenuePeriod::Week => "week",
            RevenuePeriod::Month => "month",
            RevenuePeriod::Year => "year",
        }
    }
}

/// Query parameters for `GET /coaches/me/revenue`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevenueParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gym_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<RevenuePeriod>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GymRevenue {
    pub gym_id: String,
    pub gym_name: String,
    pub total_cents: i64,
    pub sessions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueStats {
    pub total_cents: i64,
    pub currency: String,
    pub sessions: u32,
    #[serde(default)]
    pub by_gym: Vec<GymRevenue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gym {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Body for creating or replacing a gym.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GymInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Filters for `GET /gyms`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GymListParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GymPage {
    pub items: Vec<Gym>,
    pub total: u64,
    #[serde(default)]
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachProfile {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default)]
    pub hourly_rate_cents: Option<i64>,
    #[serde(default)]
    pub gym_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_rate_cents: Option<i64>,
}

/// Shape returned by the auth provider's session endpoint.
///
/// An anonymous caller receives an empty object, which deserializes to
/// `user: None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    #[serde(default)]
    pub user: Option<SessionUser>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub role: String,
}

/// Error envelope returned by the remote API on non-success statuses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_of_week_uses_lowercase_wire_names() {
        let json = serde_json::to_string(&DayOfWeek::Monday).expect("serialize");
        assert_eq!(json, "\"monday\"");
        let parsed: DayOfWeek = serde_json::from_str("\"sunday\"").expect("deserialize");
        assert_eq!(parsed, DayOfWeek::Sunday);
    }

    #[test]
    fn anonymous_session_payload_is_empty_object() {
        let payload: SessionPayload = serde_json::from_str("{}").expect("deserialize");
        assert!(payload.user.is_none());
        assert!(payload.expires.is_none());
    }

    #[test]
    fn session_payload_parses_expiry() {
        let payload: SessionPayload = serde_json::from_str(
            r#"{"user":{"id":"u1","role":"coach"},"expires":"2030-01-01T00:00:00Z"}"#,
        )
        .expect("deserialize");
        let user = payload.user.expect("user");
        assert_eq!(user.role, "coach");
        assert_eq!(payload.expires.map(|e| e.year()), Some(2030));
    }

    #[test]
    fn revenue_params_skip_absent_fields() {
        let json = serde_json::to_string(&RevenueParams::default()).expect("serialize");
        assert_eq!(json, "{}");
    }
}

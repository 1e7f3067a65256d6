//! Form validation. Errors are attached to the offending field and resolved at
//! the form boundary; they never reach the query cache.

use std::fmt;

use gymdesk_api_types::{CoachProfileUpdate, GymInput, SetAvailabilityRequest};
use serde::Serialize;
use time::Time;
use time::macros::format_description;

pub const END_BEFORE_START: &str = "End time must be after start time";

const GYM_NAME_MIN: usize = 2;
const GYM_NAME_MAX: usize = 100;
const COACH_BIO_MAX: usize = 1000;
const SPECIALTY_MAX: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Ordered collection of field-scoped validation failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// First message attached to `field`, if any.
    pub fn message_for(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|error| error.field == field)
            .map(|error| error.message.as_str())
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", error.field, error.message)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

fn parse_clock(value: &str) -> Option<Time> {
    let format = format_description!("[hour]:[minute]");
    Time::parse(value.trim(), &format).ok()
}

pub fn validate_availability(request: &SetAvailabilityRequest) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    if request.gym_id.trim().is_empty() {
        errors.push("gym_id", "Gym is required");
    }

    let start = parse_clock(&request.start_time);
    if start.is_none() {
        errors.push("start_time", "Start time must use HH:MM");
    }
    let end = parse_clock(&request.end_time);
    if end.is_none() {
        errors.push("end_time", "End time must use HH:MM");
    }

    if let (Some(start), Some(end)) = (start, end)
        && end <= start
    {
        errors.push("end_time", END_BEFORE_START);
    }

    errors.into_result()
}

pub fn validate_gym(input: &GymInput) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    let name_len = input.name.trim().chars().count();
    if name_len < GYM_NAME_MIN {
        errors.push("name", format!("Name must be at least {GYM_NAME_MIN} characters"));
    } else if name_len > GYM_NAME_MAX {
        errors.push("name", format!("Name must be at most {GYM_NAME_MAX} characters"));
    }

    if let Some(email) = non_blank(&input.email) {
        let valid = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !valid {
            errors.push("email", "Invalid email address");
        }
    }

    if let Some(phone) = non_blank(&input.phone) {
        let digits = phone.chars().filter(char::is_ascii_digit).count();
        let allowed = phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'));
        if !allowed || digits < 7 {
            errors.push("phone", "Invalid phone number");
        }
    }

    if let Some(website) = non_blank(&input.website) {
        let parsed = url::Url::parse(website);
        if !parsed.is_ok_and(|url| matches!(url.scheme(), "http" | "https")) {
            errors.push("website", "Website must be a valid http(s) URL");
        }
    }

    errors.into_result()
}

pub fn validate_coach_profile(update: &CoachProfileUpdate) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    if let Some(bio) = update.bio.as_deref()
        && bio.chars().count() > COACH_BIO_MAX
    {
        errors.push("bio", format!("Bio must be at most {COACH_BIO_MAX} characters"));
    }

    if update
        .specialties
        .iter()
        .any(|s| s.trim().is_empty() || s.chars().count() > SPECIALTY_MAX)
    {
        errors.push(
            "specialties",
            format!("Specialties must be between 1 and {SPECIALTY_MAX} characters"),
        );
    }

    if update.hourly_rate_cents.is_some_and(|rate| rate < 0) {
        errors.push("hourly_rate_cents", "Hourly rate cannot be negative");
    }

    errors.into_result()
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use gymdesk_api_types::DayOfWeek;

    use super::*;

    fn slot(start: &str, end: &str) -> SetAvailabilityRequest {
        SetAvailabilityRequest {
            gym_id: "g1".to_string(),
            day_of_week: DayOfWeek::Monday,
            start_time: start.to_string(),
            end_time: end.to_string(),
        }
    }

    #[test]
    fn accepts_well_formed_slot() {
        assert!(validate_availability(&slot("09:00", "10:00")).is_ok());
    }

    #[test]
    fn rejects_end_before_start_on_end_field() {
        let errors = validate_availability(&slot("10:00", "09:00")).expect_err("invalid");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.message_for("end_time"), Some(END_BEFORE_START));
        assert!(errors.message_for("start_time").is_none());
    }

    #[test]
    fn equal_times_are_rejected() {
        let errors = validate_availability(&slot("09:00", "09:00")).expect_err("invalid");
        assert_eq!(errors.message_for("end_time"), Some(END_BEFORE_START));
    }

    #[test]
    fn malformed_times_report_each_field() {
        let mut request = slot("9am", "25:00");
        request.gym_id = " ".to_string();
        let errors = validate_availability(&request).expect_err("invalid");
        assert!(errors.message_for("gym_id").is_some());
        assert!(errors.message_for("start_time").is_some());
        assert!(errors.message_for("end_time").is_some());
    }

    #[test]
    fn gym_form_checks_contact_fields() {
        let input = GymInput {
            name: "X".to_string(),
            email: Some("not-an-email".to_string()),
            phone: Some("12ab".to_string()),
            website: Some("ftp://gym.example".to_string()),
            ..Default::default()
        };
        let errors = validate_gym(&input).expect_err("invalid");
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["name", "email", "phone", "website"]);
    }

    #[test]
    fn gym_form_accepts_minimal_input() {
        let input = GymInput {
            name: "Iron Temple".to_string(),
            email: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(validate_gym(&input).is_ok());
    }

    #[test]
    fn coach_profile_rejects_negative_rate() {
        let update = CoachProfileUpdate {
            hourly_rate_cents: Some(-1),
            specialties: vec!["yoga".to_string(), " ".to_string()],
            ..Default::default()
        };
        let errors = validate_coach_profile(&update).expect_err("invalid");
        assert!(errors.message_for("hourly_rate_cents").is_some());
        assert!(errors.message_for("specialties").is_some());
    }

    #[test]
    fn display_joins_field_messages() {
        let mut errors = FieldErrors::new();
        errors.push("a", "first");
        errors.push("b", "second");
        assert_eq!(errors.to_string(), "a: first; b: second");
    }
}

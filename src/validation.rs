use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::{time::parse_date, AppError, AppResult};

pub const VALIDATION_EMAIL: &str = "VALIDATION/EMAIL";
pub const VALIDATION_PHONE: &str = "VALIDATION/PHONE";
pub const VALIDATION_ROLE: &str = "VALIDATION/ROLE";
pub const VALIDATION_FIELD_TYPE: &str = "VALIDATION/FIELD_TYPE";

pub const MEMBER_ROLES: &[&str] = &["member", "treasurer", "secretary", "pastor", "admin"];

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email validation pattern to compile")
});

static PHONE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\+?[0-9][0-9 \-]{6,18}[0-9]$").expect("phone validation pattern to compile")
});

#[allow(clippy::result_large_err)]
fn text<'a>(data: &'a Map<String, Value>, field: &str) -> AppResult<Option<&'a str>> {
    match data.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(AppError::new(VALIDATION_FIELD_TYPE, "Field must be text.")
            .with_context("field", field.to_string())),
    }
}

#[allow(clippy::result_large_err)]
fn validate_member(data: &Map<String, Value>) -> AppResult<()> {
    if let Some(email) = text(data, "email")? {
        if !EMAIL_PATTERN.is_match(email.trim()) {
            return Err(AppError::new(VALIDATION_EMAIL, "Email address looks invalid.")
                .with_context("email", email.to_string()));
        }
    }
    if let Some(phone) = text(data, "phone")? {
        if !PHONE_PATTERN.is_match(phone.trim()) {
            return Err(AppError::new(VALIDATION_PHONE, "Phone number looks invalid.")
                .with_context("phone", phone.to_string()));
        }
    }
    if let Some(role) = text(data, "role")? {
        if !MEMBER_ROLES.contains(&role) {
            return Err(AppError::new(VALIDATION_ROLE, "Role not recognised.")
                .with_context("role", role.to_string()));
        }
    }
    if let Some(joined_on) = text(data, "joined_on")? {
        parse_date(joined_on)?;
    }
    Ok(())
}

#[allow(clippy::result_large_err)]
fn validate_event(data: &Map<String, Value>) -> AppResult<()> {
    if let Some(starts_on) = text(data, "starts_on")? {
        parse_date(starts_on)?;
    }
    Ok(())
}

/// Field-level checks applied before a registry row is written.
#[allow(clippy::result_large_err)]
pub fn validate_row(table: &str, data: &Map<String, Value>) -> AppResult<()> {
    let result = match table {
        "members" => validate_member(data),
        "events" => validate_event(data),
        _ => Ok(()),
    };
    result.map_err(|err| err.with_context("table", table.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn accepts_complete_member() {
        let data = map(json!({
            "full_name": "Grace Wanjiru",
            "email": "grace@example.org",
            "phone": "+254 712 345678",
            "role": "treasurer",
            "joined_on": "2019-06-02"
        }));
        validate_row("members", &data).unwrap();
    }

    #[test]
    fn rejects_bad_member_fields() {
        let email = map(json!({ "email": "grace.example.org" }));
        assert_eq!(validate_row("members", &email).unwrap_err().code(), VALIDATION_EMAIL);

        let phone = map(json!({ "phone": "call me" }));
        assert_eq!(validate_row("members", &phone).unwrap_err().code(), VALIDATION_PHONE);

        let role = map(json!({ "role": "bishop" }));
        let err = validate_row("members", &role).unwrap_err();
        assert_eq!(err.code(), VALIDATION_ROLE);
        assert_eq!(err.context().get("table").map(String::as_str), Some("members"));

        let typed = map(json!({ "email": 7 }));
        assert_eq!(validate_row("members", &typed).unwrap_err().code(), VALIDATION_FIELD_TYPE);
    }

    #[test]
    fn event_dates_must_be_iso() {
        let bad = map(json!({ "title": "Harvest", "starts_on": "next sunday" }));
        assert_eq!(validate_row("events", &bad).unwrap_err().code(), "VALIDATION/DATE");
        let good = map(json!({ "title": "Harvest", "starts_on": "2024-09-29" }));
        validate_row("events", &good).unwrap();
    }
}

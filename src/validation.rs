//! Field validation for license requests.
//!
//! Validators return a [`ValidationError`] naming the offending field so that
//! the HTTP layer can echo it back to the caller.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

/// Maximum length of an owner name, in bytes.
pub const MAX_OWNER_LEN: usize = 255;

/// Validation error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate that a string is not empty or whitespace only.
///
/// # Example
/// ```
/// use licensa::validation::validate_not_empty;
///
/// assert!(validate_not_empty("Acme Inc", "owner").is_ok());
/// assert!(validate_not_empty("", "owner").is_err());
/// assert!(validate_not_empty("   ", "owner").is_err());
/// ```
pub fn validate_not_empty(value: &str, field_name: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        Err(ValidationError::new(field_name, "cannot be empty"))
    } else {
        Ok(())
    }
}

/// Validate string length (in bytes) is within bounds.
pub fn validate_length(
    value: &str,
    min: usize,
    max: usize,
    field_name: &str,
) -> ValidationResult<()> {
    let len = value.len();
    if len < min {
        Err(ValidationError::new(
            field_name,
            format!("must be at least {} characters", min),
        ))
    } else if len > max {
        Err(ValidationError::new(
            field_name,
            format!("must be at most {} characters", max),
        ))
    } else {
        Ok(())
    }
}

/// Validate an owner name: non-blank and at most [`MAX_OWNER_LEN`] bytes.
pub fn validate_owner(value: &str, field_name: &str) -> ValidationResult<()> {
    validate_not_empty(value, field_name)?;
    validate_length(value, 1, MAX_OWNER_LEN, field_name)
}

/// Validate that an entitlement limit is strictly positive.
pub fn validate_positive(value: i64, field_name: &str) -> ValidationResult<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(ValidationError::new(
            field_name,
            format!("must be greater than 0, got {value}"),
        ))
    }
}

/// Validate that `value` lies strictly after `bound`.
pub fn validate_after(
    value: DateTime<Utc>,
    bound: DateTime<Utc>,
    field_name: &str,
) -> ValidationResult<()> {
    if value > bound {
        Ok(())
    } else {
        Err(ValidationError::new(
            field_name,
            format!("must be after {}", bound.to_rfc3339()),
        ))
    }
}

fn uuid_regex() -> &'static Regex {
    static UUID_RE: OnceLock<Regex> = OnceLock::new();
    UUID_RE.get_or_init(|| {
        Regex::new(
            r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
        )
        .expect("UUID pattern is a valid regex")
    })
}

/// Validate a UUID format.
///
/// # Example
/// ```
/// use licensa::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000", "license_id").is_ok());
/// assert!(validate_uuid("invalid-uuid", "license_id").is_err());
/// ```
pub fn validate_uuid(value: &str, field_name: &str) -> ValidationResult<()> {
    if uuid_regex().is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new(
            field_name,
            "invalid UUID format (expected: xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx)",
        ))
    }
}

/// Parse an ISO 8601 datetime into UTC.
///
/// Accepts:
/// - RFC 3339: `2025-12-31T23:59:59Z` (any offset, normalized to UTC)
/// - Without timezone: `2025-12-31T23:59:59` (taken as UTC)
/// - Date only: `2025-12-31` (end of that day, UTC)
pub fn parse_datetime(value: &str, field_name: &str) -> ValidationResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.and_utc());
    }

    if let Some(dt) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(23, 59, 59))
    {
        return Ok(dt.and_utc());
    }

    Err(ValidationError::new(
        field_name,
        "invalid datetime format (expected: ISO 8601, e.g., '2025-12-31T23:59:59Z' or '2025-12-31')",
    ))
}

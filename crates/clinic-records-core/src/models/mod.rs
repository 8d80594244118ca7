//! Domain models for the clinic records system.

mod admin;
mod patient;
mod reference;
mod visit;

pub use admin::*;
pub use patient::*;
pub use reference::*;
pub use visit::*;

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

/// Rejected input, naming the offending field.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{field} {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Current local time as stored in timestamp columns.
pub fn now_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub(crate) fn blank_to_none(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn validate_date(field: &'static str, value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ValidationError::new(field, format!("must be YYYY-MM-DD, got '{}'", value)))
}

/// Accepts HH:MM or HH:MM:SS and returns HH:MM:SS.
pub(crate) fn validate_time(field: &'static str, value: &str) -> Result<String, ValidationError> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map(|t| t.format("%H:%M:%S").to_string())
        .map_err(|_| ValidationError::new(field, format!("must be HH:MM[:SS], got '{}'", value)))
}

pub(crate) fn validate_reference(reference: i64) -> Result<(), ValidationError> {
    if reference <= 0 {
        return Err(ValidationError::new(
            "reference_number",
            "must be a positive number",
        ));
    }
    Ok(())
}

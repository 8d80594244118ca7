//! Reference number display and parsing.
//!
//! Reference numbers are plain positive integers in the store. Staff read and
//! type them in the paper-record form `00-00-00` (six digits, zero padded).

use serde::{Deserialize, Serialize};

/// Who currently holds a reference number.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReferenceHolder {
    /// No patient and no visit uses the number
    Free,
    /// A patient record carries the number
    Patient { patient_id: i64 },
    /// Only visits carry the number, all of them `patient_id`'s
    Visits { patient_id: i64 },
}

impl ReferenceHolder {
    pub fn is_free(&self) -> bool {
        matches!(self, ReferenceHolder::Free)
    }

    /// The patient the number traces to, if any.
    pub fn owner(&self) -> Option<i64> {
        match *self {
            ReferenceHolder::Free => None,
            ReferenceHolder::Patient { patient_id } | ReferenceHolder::Visits { patient_id } => {
                Some(patient_id)
            }
        }
    }
}

/// Render a reference number as `00-00-00`. Numbers wider than six digits
/// are returned unformatted.
pub fn format_reference(reference: i64) -> String {
    let digits = format!("{:06}", reference);
    if digits.len() == 6 {
        format!("{}-{}-{}", &digits[..2], &digits[2..4], &digits[4..])
    } else {
        digits
    }
}

/// Parse a reference number typed either as digits or in display form.
pub fn parse_reference(input: &str) -> Option<i64> {
    let trimmed = input.trim();
    if trimmed.is_empty()
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || c == '-' || c == ' ')
    {
        return None;
    }
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    match digits.parse::<i64>() {
        Ok(n) if n > 0 => Some(n),
        _ => None,
    }
}

/// Digits of a search string, for matching against reference numbers.
///
/// Only queries written as a reference (digits, `-` and spaces) qualify, so a
/// name search never matches by the digits it happens to contain. Zero
/// padding is dropped so `00-01-25` and `05` match the stored integer text.
pub(crate) fn reference_search_digits(query: &str) -> Option<String> {
    let query = query.trim();
    if query.is_empty() || !query.chars().all(|c| c.is_ascii_digit() || c == '-' || c == ' ') {
        return None;
    }
    let digits: String = query.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    match digits.trim_start_matches('0') {
        "" => Some("0".to_string()),
        trimmed => Some(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_reference() {
        assert_eq!(format_reference(1), "00-00-01");
        assert_eq!(format_reference(12345), "01-23-45");
        assert_eq!(format_reference(1234567), "1234567");
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(parse_reference("00-01-25"), Some(125));
        assert_eq!(parse_reference(" 42 "), Some(42));
        assert_eq!(parse_reference("00-00-00"), None);
        assert_eq!(parse_reference("Cruz"), None);
        assert_eq!(parse_reference(""), None);
    }

    #[test]
    fn test_reference_search_digits() {
        assert_eq!(reference_search_digits("00-01-25"), Some("125".into()));
        assert_eq!(reference_search_digits(" 05 "), Some("5".into()));
        assert_eq!(reference_search_digits("00 01 25"), Some("125".into()));
        assert_eq!(reference_search_digits("00-00-00"), Some("0".into()));
        assert_eq!(reference_search_digits("Cruz"), None);
        assert_eq!(reference_search_digits("Cruz 1"), None);
        assert_eq!(reference_search_digits("--"), None);
    }
}

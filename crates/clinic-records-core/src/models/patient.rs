//! Patient models.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{blank_to_none, validate_date, validate_reference, ValidationError};

/// A registered patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Store-generated surrogate ID, never reused
    pub patient_id: i64,
    /// Human-facing reference number (mirrors the paper record number)
    pub reference_number: Option<i64>,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    /// Date of birth (YYYY-MM-DD)
    pub date_of_birth: Option<String>,
    pub sex: Option<String>,
    pub civil_status: Option<String>,
    pub occupation: Option<String>,
    pub parents: Option<String>,
    pub parent_contact: Option<String>,
    pub school: Option<String>,
    pub contact_number: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    /// Registration timestamp, set once at creation
    pub registered_date: Option<String>,
}

impl Patient {
    /// "Last, First Middle" as shown in record lists.
    pub fn full_name(&self) -> String {
        full_name(&self.last_name, &self.first_name, self.middle_name.as_deref())
    }

    /// Age in whole years on the given day, if the birth date is known.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let dob = NaiveDate::parse_from_str(self.date_of_birth.as_deref()?, "%Y-%m-%d").ok()?;
        age_on(dob, today)
    }
}

/// Editable patient fields, used both to register and to update a patient.
///
/// A `reference_number` of `None` means "allocate one" on registration and
/// "leave unchanged" on update.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientInput {
    pub reference_number: Option<i64>,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub sex: Option<String>,
    pub civil_status: Option<String>,
    pub occupation: Option<String>,
    pub parents: Option<String>,
    pub parent_contact: Option<String>,
    pub school: Option<String>,
    pub contact_number: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

impl PatientInput {
    /// Create input with the required name fields.
    pub fn new(last_name: impl Into<String>, first_name: impl Into<String>) -> Self {
        Self {
            last_name: last_name.into(),
            first_name: first_name.into(),
            ..Default::default()
        }
    }

    /// Trim names, turn blank optional fields into `None` and check formats.
    pub fn normalized(&self) -> Result<Self, ValidationError> {
        let last_name = self.last_name.trim().to_string();
        let first_name = self.first_name.trim().to_string();
        if last_name.is_empty() {
            return Err(ValidationError::new("last_name", "is required"));
        }
        if first_name.is_empty() {
            return Err(ValidationError::new("first_name", "is required"));
        }
        if let Some(reference) = self.reference_number {
            validate_reference(reference)?;
        }

        let date_of_birth = blank_to_none(&self.date_of_birth);
        if let Some(dob) = &date_of_birth {
            validate_date("date_of_birth", dob)?;
        }

        Ok(Self {
            reference_number: self.reference_number,
            last_name,
            first_name,
            middle_name: blank_to_none(&self.middle_name),
            date_of_birth,
            sex: blank_to_none(&self.sex),
            civil_status: blank_to_none(&self.civil_status),
            occupation: blank_to_none(&self.occupation),
            parents: blank_to_none(&self.parents),
            parent_contact: blank_to_none(&self.parent_contact),
            school: blank_to_none(&self.school),
            contact_number: blank_to_none(&self.contact_number),
            address: blank_to_none(&self.address),
            notes: blank_to_none(&self.notes),
        })
    }
}

/// A patient row returned by searches, with aggregated visit info.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientSummary {
    pub patient: Patient,
    /// Most recent visit date, if any
    pub last_visit: Option<String>,
    pub visit_count: u32,
}

/// Visit statistics for one patient.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientStats {
    pub total_visits: u32,
    pub first_visit: Option<String>,
    pub last_visit: Option<String>,
}

pub(crate) fn full_name(last: &str, first: &str, middle: Option<&str>) -> String {
    match middle {
        Some(middle) => format!("{}, {} {}", last, first, middle),
        None => format!("{}, {}", last, first),
    }
}

/// Whole years between `dob` and `today`; `None` for future birth dates.
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> Option<u32> {
    if dob > today {
        return None;
    }
    let mut age = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    u32::try_from(age).ok()
}

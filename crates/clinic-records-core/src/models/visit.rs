//! Visit (clinical encounter) models.

use serde::{Deserialize, Serialize};

use super::patient::full_name;
use super::{blank_to_none, validate_date, validate_reference, validate_time, ValidationError};

/// How a visit entered the system.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum VisitType {
    /// Recorded live at the front desk
    #[default]
    New,
    /// Back-dated entry digitized from a paper record
    Encode,
}

impl VisitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitType::New => "new",
            VisitType::Encode => "encode",
        }
    }

    /// Parse a stored tag. Unknown or missing tags read as `New`.
    pub fn from_db(s: Option<&str>) -> Self {
        match s {
            Some("encode") => VisitType::Encode,
            _ => VisitType::New,
        }
    }
}

/// A logged visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Visit {
    pub visit_id: i64,
    /// Owning patient
    pub patient_id: i64,
    /// Copy (or override) of the owning patient's reference number
    pub reference_number: i64,
    /// Visit date (YYYY-MM-DD)
    pub visit_date: String,
    /// Visit time (HH:MM:SS)
    pub visit_time: Option<String>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub blood_pressure: Option<String>,
    pub temperature_celsius: Option<f64>,
    pub medical_notes: Option<String>,
    pub created_at: Option<String>,
    pub modified_at: Option<String>,
    pub visit_type: VisitType,
}

/// Editable visit fields.
///
/// On creation a `reference_number` of `None` means "use the patient's".
/// On update it means "leave unchanged"; a different number re-parents the
/// visit when another patient holds that number.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VisitInput {
    pub visit_date: String,
    pub visit_time: Option<String>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub blood_pressure: Option<String>,
    pub temperature_celsius: Option<f64>,
    pub medical_notes: Option<String>,
    pub reference_number: Option<i64>,
    /// Ignored by updates
    pub visit_type: VisitType,
}

impl VisitInput {
    /// Create input for a visit on the given date and time.
    pub fn new(visit_date: impl Into<String>, visit_time: impl Into<String>) -> Self {
        Self {
            visit_date: visit_date.into(),
            visit_time: Some(visit_time.into()),
            ..Default::default()
        }
    }

    /// Check formats and normalize the time to HH:MM:SS.
    pub fn normalized(&self) -> Result<Self, ValidationError> {
        let visit_date = self.visit_date.trim().to_string();
        validate_date("visit_date", &visit_date)?;

        let visit_time = match blank_to_none(&self.visit_time) {
            Some(time) => Some(validate_time("visit_time", &time)?),
            None => None,
        };

        if let Some(reference) = self.reference_number {
            validate_reference(reference)?;
        }
        check_measurement("weight_kg", self.weight_kg)?;
        check_measurement("height_cm", self.height_cm)?;
        check_measurement("temperature_celsius", self.temperature_celsius)?;

        Ok(Self {
            visit_date,
            visit_time,
            weight_kg: self.weight_kg,
            height_cm: self.height_cm,
            blood_pressure: blank_to_none(&self.blood_pressure),
            temperature_celsius: self.temperature_celsius,
            medical_notes: blank_to_none(&self.medical_notes),
            reference_number: self.reference_number,
            visit_type: self.visit_type,
        })
    }
}

fn check_measurement(field: &'static str, value: Option<f64>) -> Result<(), ValidationError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => {
            Err(ValidationError::new(field, "must be a non-negative number"))
        }
        _ => Ok(()),
    }
}

/// A visit joined with its patient's identifying fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitWithPatient {
    pub visit: Visit,
    /// The owning patient's current reference number
    pub patient_reference_number: Option<i64>,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub date_of_birth: Option<String>,
}

impl VisitWithPatient {
    pub fn full_name(&self) -> String {
        full_name(&self.last_name, &self.first_name, self.middle_name.as_deref())
    }

    /// The patient's number when set, otherwise the visit's own.
    pub fn display_reference(&self) -> i64 {
        self.patient_reference_number
            .unwrap_or(self.visit.reference_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visit_type_round_trip() {
        assert_eq!(VisitType::from_db(Some("encode")), VisitType::Encode);
        assert_eq!(VisitType::from_db(Some("new")), VisitType::New);
        assert_eq!(VisitType::from_db(None), VisitType::New);
        assert_eq!(VisitType::Encode.as_str(), "encode");
    }

    #[test]
    fn test_normalized_pads_time() {
        let input = VisitInput::new("2024-01-10", "09:00");
        let normalized = input.normalized().unwrap();
        assert_eq!(normalized.visit_time, Some("09:00:00".into()));
    }

    #[test]
    fn test_normalized_rejects_bad_values() {
        assert!(VisitInput::new("2024-13-01", "09:00:00").normalized().is_err());
        assert!(VisitInput::new("2024-01-10", "25:00").normalized().is_err());

        let mut input = VisitInput::new("2024-01-10", "09:00:00");
        input.weight_kg = Some(f64::NAN);
        assert_eq!(input.normalized().unwrap_err().field, "weight_kg");

        input.weight_kg = Some(-3.0);
        assert!(input.normalized().is_err());

        input.weight_kg = Some(60.5);
        input.reference_number = Some(0);
        assert_eq!(input.normalized().unwrap_err().field, "reference_number");
    }

    #[test]
    fn test_blank_time_allowed() {
        let mut input = VisitInput::new("2024-01-10", "");
        input.blood_pressure = Some(" ".into());
        let normalized = input.normalized().unwrap();
        assert_eq!(normalized.visit_time, None);
        assert_eq!(normalized.blood_pressure, None);
    }
}

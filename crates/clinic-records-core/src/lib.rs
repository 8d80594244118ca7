//! Clinic Records Core Library
//!
//! Local single-file patient records and visit log for a single clinic.
//!
//! # Architecture
//!
//! ```text
//!   Front desk UI (foreign bindings)
//!                │
//!          ClinicCore (FFI)
//!                │
//!   ┌────────────┼─────────────────────┬──────────────────┐
//!   │            │                     │                  │
//!   ▼            ▼                     ▼                  ▼
//! Storage    Reference allocator    Query layer     Maintenance
//! (CRUD,     (next number,          (filters,       (backup, merge,
//!  migrations) reassignment, merge)  pagination)     CSV export)
//!   │            │                     │                  │
//!   └────────────┴──────────┬──────────┴──────────────────┘
//!                           ▼
//!              SQLite: patients, visit_logs, admin_users
//! ```
//!
//! # Reference numbers
//!
//! A patient's reference number is the human-facing record number. It is
//! unique among patients, and a number held by a patient may only appear on
//! that patient's visits. All visits of a patient normally share its number.
//!
//! # Modules
//!
//! - [`db`]: SQLite storage, migrations, CRUD and the reference allocator
//! - [`models`]: Domain types (Patient, Visit, AdminAccount, ReferenceHolder)
//! - [`query`]: Filtered, paginated patient and visit search
//! - [`maintenance`]: Backup, cross-store merge and CSV export

pub mod db;
pub mod maintenance;
pub mod models;
pub mod query;

// Re-export commonly used types
pub use db::{Database, DbError, DbResult};
pub use maintenance::{CsvExporter, MergeReport};
pub use models::{
    format_reference, parse_reference, AdminAccount, Patient, PatientInput, PatientStats,
    PatientSummary, ReferenceHolder, Visit, VisitInput, VisitType, VisitWithPatient,
};
pub use query::{DateRange, Page, PageRequest, PatientFilters};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::path::Path;
use std::sync::{Arc, Mutex};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<DbError> for ClinicError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::InvalidArgument(msg) => ClinicError::InvalidArgument(msg),
            DbError::Constraint(msg) => ClinicError::ConstraintViolation(msg),
            DbError::NotFound(msg) => ClinicError::NotFound(msg),
            DbError::Json(e) => ClinicError::SerializationError(e.to_string()),
            other => ClinicError::StorageError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ClinicError {
    fn from(e: serde_json::Error) -> Self {
        ClinicError::SerializationError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicError::StorageError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<ClinicCore>, ClinicError> {
    let db = Database::open(&path)?;
    Ok(Arc::new(ClinicCore {
        db: Arc::new(Mutex::new(db)),
    }))
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<ClinicCore>, ClinicError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(ClinicCore {
        db: Arc::new(Mutex::new(db)),
    }))
}

/// Render a reference number as `00-00-00`.
#[uniffi::export]
pub fn format_reference_number(reference_number: i64) -> String {
    format_reference(reference_number)
}

/// Parse a typed or display-formatted reference number.
#[uniffi::export]
pub fn parse_reference_number(input: String) -> Option<i64> {
    parse_reference(&input)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
#[derive(uniffi::Object)]
pub struct ClinicCore {
    db: Arc<Mutex<Database>>,
}

#[uniffi::export]
impl ClinicCore {
    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// Register a patient. A missing reference number is allocated.
    pub fn create_patient(&self, input: FfiPatientInput) -> Result<FfiPatient, ClinicError> {
        let db = self.db.lock()?;
        let patient = db.create_patient(&input.into())?;
        Ok(patient.into())
    }

    /// Replace a patient's editable fields.
    pub fn update_patient(
        &self,
        patient_id: i64,
        input: FfiPatientInput,
    ) -> Result<bool, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.update_patient(patient_id, &input.into())?)
    }

    pub fn get_patient(&self, patient_id: i64) -> Result<Option<FfiPatient>, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.get_patient(patient_id)?.map(|p| p.into()))
    }

    pub fn get_patient_by_reference(
        &self,
        reference_number: i64,
    ) -> Result<Option<FfiPatient>, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.get_patient_by_reference(reference_number)?.map(|p| p.into()))
    }

    pub fn list_patients(&self) -> Result<Vec<FfiPatient>, ClinicError> {
        let db = self.db.lock()?;
        let patients = db.list_patients()?;
        Ok(patients.into_iter().map(|p| p.into()).collect())
    }

    pub fn patient_count(&self) -> Result<u64, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.patient_count()?)
    }

    /// Delete a patient and all of its visits.
    pub fn delete_patient(&self, patient_id: i64) -> Result<bool, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.delete_patient(patient_id)?)
    }

    pub fn get_patient_stats(&self, patient_id: i64) -> Result<FfiPatientStats, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.get_patient_stats(patient_id)?.into())
    }

    // =========================================================================
    // Visit Operations
    // =========================================================================

    /// Log a visit; without a reference number it takes the patient's.
    pub fn add_visit(&self, patient_id: i64, input: FfiVisitInput) -> Result<FfiVisit, ClinicError> {
        let db = self.db.lock()?;
        let visit = db.add_visit(patient_id, &input.into())?;
        Ok(visit.into())
    }

    /// Replace a visit's editable fields. A reference number held by another
    /// patient moves the visit to that patient.
    pub fn update_visit(&self, visit_id: i64, input: FfiVisitInput) -> Result<bool, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.update_visit(visit_id, &input.into())?)
    }

    pub fn get_visit(&self, visit_id: i64) -> Result<Option<FfiVisitWithPatient>, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.get_visit(visit_id)?.map(|v| v.into()))
    }

    pub fn get_visit_by_reference(
        &self,
        reference_number: i64,
    ) -> Result<Option<FfiVisitWithPatient>, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.get_visit_by_reference(reference_number)?.map(|v| v.into()))
    }

    pub fn get_visits_by_date(
        &self,
        visit_date: String,
    ) -> Result<Vec<FfiVisitWithPatient>, ClinicError> {
        let db = self.db.lock()?;
        let visits = db.get_visits_by_date(&visit_date)?;
        Ok(visits.into_iter().map(|v| v.into()).collect())
    }

    pub fn get_patient_visits(&self, patient_id: i64) -> Result<Vec<FfiVisit>, ClinicError> {
        let db = self.db.lock()?;
        let visits = db.get_patient_visits(patient_id)?;
        Ok(visits.into_iter().map(|v| v.into()).collect())
    }

    pub fn list_visits(&self) -> Result<Vec<FfiVisitWithPatient>, ClinicError> {
        let db = self.db.lock()?;
        let visits = db.list_visits()?;
        Ok(visits.into_iter().map(|v| v.into()).collect())
    }

    pub fn visit_count(&self) -> Result<u64, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.visit_count()?)
    }

    /// Visit date of the most recently entered back-dated visit.
    pub fn last_encoded_visit_date(&self) -> Result<Option<String>, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.last_encoded_visit_date()?)
    }

    // =========================================================================
    // Reference Operations
    // =========================================================================

    pub fn next_reference_number(&self) -> Result<i64, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.next_reference_number()?)
    }

    pub fn is_reference_available(&self, reference_number: i64) -> Result<bool, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.is_reference_available(reference_number)?)
    }

    /// Who holds a number, so the UI can offer overwrite or cancel.
    pub fn reference_holder(
        &self,
        reference_number: i64,
    ) -> Result<FfiReferenceHolder, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.reference_holder(reference_number)?.into())
    }

    /// Move all visits of one patient to another. Returns the number moved.
    pub fn reassign_visits(
        &self,
        old_patient_id: i64,
        new_patient_id: i64,
    ) -> Result<u64, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.reassign_visits(old_patient_id, new_patient_id)? as u64)
    }

    /// Move the source patient's visits to the target and delete the source.
    pub fn merge_patients(&self, source_id: i64, target_id: i64) -> Result<(), ClinicError> {
        let db = self.db.lock()?;
        Ok(db.merge_patients(source_id, target_id)?)
    }

    // =========================================================================
    // Search Operations
    // =========================================================================

    /// Name or reference search; blank lists recently visited patients.
    pub fn search_patients(&self, query: String) -> Result<Vec<FfiPatientSummary>, ClinicError> {
        let db = self.db.lock()?;
        let found = db.search_patients(&query)?;
        Ok(found.into_iter().map(|s| s.into()).collect())
    }

    pub fn search_patients_filtered(
        &self,
        query: String,
        filters: FfiPatientFilters,
        page: i64,
        per_page: i64,
    ) -> Result<FfiPatientPage, ClinicError> {
        let db = self.db.lock()?;
        let result =
            db.search_patients_filtered(&query, &filters.into(), PageRequest::new(page, per_page))?;
        Ok(result.into())
    }

    pub fn get_patients_paginated(
        &self,
        page: i64,
        per_page: i64,
    ) -> Result<FfiPatientListPage, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.get_patients_paginated(PageRequest::new(page, per_page))?.into())
    }

    pub fn get_visits_paginated(
        &self,
        page: i64,
        per_page: i64,
        query: String,
        start_date: Option<String>,
        end_date: Option<String>,
    ) -> Result<FfiVisitPage, ClinicError> {
        let db = self.db.lock()?;
        let dates = DateRange {
            start: start_date,
            end: end_date,
        };
        Ok(db
            .get_visits_paginated(PageRequest::new(page, per_page), &query, &dates)?
            .into())
    }

    pub fn get_patient_visits_paginated(
        &self,
        patient_id: i64,
        page: i64,
        per_page: i64,
        start_date: Option<String>,
        end_date: Option<String>,
    ) -> Result<FfiPatientVisitPage, ClinicError> {
        let db = self.db.lock()?;
        let dates = DateRange {
            start: start_date,
            end: end_date,
        };
        Ok(db
            .get_patient_visits_paginated(patient_id, PageRequest::new(page, per_page), &dates)?
            .into())
    }

    // =========================================================================
    // Admin Operations
    // =========================================================================

    pub fn admin_exists(&self) -> Result<bool, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.admin_exists()?)
    }

    pub fn create_admin(&self, username: String, password: String) -> Result<(), ClinicError> {
        let db = self.db.lock()?;
        db.create_admin(&username, &password)?;
        Ok(())
    }

    pub fn verify_admin(&self, username: String, password: String) -> Result<bool, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.verify_admin(&username, &password)?)
    }

    pub fn admin_username(&self) -> Result<Option<String>, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.admin_username()?)
    }

    pub fn update_admin_username(
        &self,
        old_username: String,
        new_username: String,
    ) -> Result<bool, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.update_admin_username(&old_username, &new_username)?)
    }

    pub fn update_admin_password(
        &self,
        username: String,
        new_password: String,
    ) -> Result<bool, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.update_admin_password(&username, &new_password)?)
    }

    // =========================================================================
    // Maintenance Operations
    // =========================================================================

    /// Copy the store file. Returns the backup path.
    pub fn backup(&self, destination: Option<String>) -> Result<String, ClinicError> {
        let db = self.db.lock()?;
        let path = db.backup(destination.as_deref().map(Path::new))?;
        Ok(path.display().to_string())
    }

    pub fn backup_to_dir(&self, dir: String) -> Result<String, ClinicError> {
        let db = self.db.lock()?;
        let path = db.backup_to_dir(Path::new(&dir))?;
        Ok(path.display().to_string())
    }

    /// Merge another store file into this one.
    pub fn merge_database(&self, source_path: String) -> Result<FfiMergeReport, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.merge_database(Path::new(&source_path))?.into())
    }

    /// Merge another store file and return the report as JSON.
    pub fn merge_database_json(&self, source_path: String) -> Result<String, ClinicError> {
        let db = self.db.lock()?;
        let report = db.merge_database(Path::new(&source_path))?;
        Ok(report.to_json()?)
    }

    /// Write the visit log CSV. Returns the number of visit rows.
    pub fn export_csv(&self, path: String) -> Result<u64, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.export_csv(Path::new(&path))? as u64)
    }

    /// The visit log CSV as a string.
    pub fn render_csv(&self) -> Result<String, ClinicError> {
        let db = self.db.lock()?;
        Ok(CsvExporter::new(&db).render()?)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub patient_id: i64,
    pub reference_number: Option<i64>,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub full_name: String,
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
    pub registered_date: Option<String>,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            full_name: patient.full_name(),
            patient_id: patient.patient_id,
            reference_number: patient.reference_number,
            last_name: patient.last_name,
            first_name: patient.first_name,
            middle_name: patient.middle_name,
            date_of_birth: patient.date_of_birth,
            sex: patient.sex,
            civil_status: patient.civil_status,
            occupation: patient.occupation,
            parents: patient.parents,
            parent_contact: patient.parent_contact,
            school: patient.school,
            contact_number: patient.contact_number,
            address: patient.address,
            notes: patient.notes,
            registered_date: patient.registered_date,
        }
    }
}

/// FFI-safe patient registration or edit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientInput {
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

impl From<FfiPatientInput> for PatientInput {
    fn from(input: FfiPatientInput) -> Self {
        PatientInput {
            reference_number: input.reference_number,
            last_name: input.last_name,
            first_name: input.first_name,
            middle_name: input.middle_name,
            date_of_birth: input.date_of_birth,
            sex: input.sex,
            civil_status: input.civil_status,
            occupation: input.occupation,
            parents: input.parents,
            parent_contact: input.parent_contact,
            school: input.school,
            contact_number: input.contact_number,
            address: input.address,
            notes: input.notes,
        }
    }
}

/// FFI-safe patient search row.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientSummary {
    pub patient: FfiPatient,
    pub last_visit: Option<String>,
    pub visit_count: u32,
}

impl From<PatientSummary> for FfiPatientSummary {
    fn from(summary: PatientSummary) -> Self {
        Self {
            patient: summary.patient.into(),
            last_visit: summary.last_visit,
            visit_count: summary.visit_count,
        }
    }
}

/// FFI-safe patient visit statistics.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientStats {
    pub total_visits: u32,
    pub first_visit: Option<String>,
    pub last_visit: Option<String>,
}

impl From<PatientStats> for FfiPatientStats {
    fn from(stats: PatientStats) -> Self {
        Self {
            total_visits: stats.total_visits,
            first_visit: stats.first_visit,
            last_visit: stats.last_visit,
        }
    }
}

/// FFI-safe visit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiVisitType {
    New,
    Encode,
}

impl From<VisitType> for FfiVisitType {
    fn from(visit_type: VisitType) -> Self {
        match visit_type {
            VisitType::New => FfiVisitType::New,
            VisitType::Encode => FfiVisitType::Encode,
        }
    }
}

impl From<FfiVisitType> for VisitType {
    fn from(visit_type: FfiVisitType) -> Self {
        match visit_type {
            FfiVisitType::New => VisitType::New,
            FfiVisitType::Encode => VisitType::Encode,
        }
    }
}

/// FFI-safe visit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisit {
    pub visit_id: i64,
    pub patient_id: i64,
    pub reference_number: i64,
    pub visit_date: String,
    pub visit_time: Option<String>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub blood_pressure: Option<String>,
    pub temperature_celsius: Option<f64>,
    pub medical_notes: Option<String>,
    pub created_at: Option<String>,
    pub modified_at: Option<String>,
    pub visit_type: FfiVisitType,
}

impl From<Visit> for FfiVisit {
    fn from(visit: Visit) -> Self {
        Self {
            visit_id: visit.visit_id,
            patient_id: visit.patient_id,
            reference_number: visit.reference_number,
            visit_date: visit.visit_date,
            visit_time: visit.visit_time,
            weight_kg: visit.weight_kg,
            height_cm: visit.height_cm,
            blood_pressure: visit.blood_pressure,
            temperature_celsius: visit.temperature_celsius,
            medical_notes: visit.medical_notes,
            created_at: visit.created_at,
            modified_at: visit.modified_at,
            visit_type: visit.visit_type.into(),
        }
    }
}

/// FFI-safe visit entry or edit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisitInput {
    pub visit_date: String,
    pub visit_time: Option<String>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub blood_pressure: Option<String>,
    pub temperature_celsius: Option<f64>,
    pub medical_notes: Option<String>,
    pub reference_number: Option<i64>,
    pub visit_type: FfiVisitType,
}

impl From<FfiVisitInput> for VisitInput {
    fn from(input: FfiVisitInput) -> Self {
        VisitInput {
            visit_date: input.visit_date,
            visit_time: input.visit_time,
            weight_kg: input.weight_kg,
            height_cm: input.height_cm,
            blood_pressure: input.blood_pressure,
            temperature_celsius: input.temperature_celsius,
            medical_notes: input.medical_notes,
            reference_number: input.reference_number,
            visit_type: input.visit_type.into(),
        }
    }
}

/// FFI-safe visit with its patient's names.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisitWithPatient {
    pub visit: FfiVisit,
    pub display_reference: i64,
    pub full_name: String,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub date_of_birth: Option<String>,
}

impl From<VisitWithPatient> for FfiVisitWithPatient {
    fn from(row: VisitWithPatient) -> Self {
        Self {
            display_reference: row.display_reference(),
            full_name: row.full_name(),
            visit: row.visit.into(),
            last_name: row.last_name,
            first_name: row.first_name,
            middle_name: row.middle_name,
            date_of_birth: row.date_of_birth,
        }
    }
}

/// FFI-safe reference number holder.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum FfiReferenceHolder {
    Free,
    Patient { patient_id: i64 },
    Visits { patient_id: i64 },
}

impl From<ReferenceHolder> for FfiReferenceHolder {
    fn from(holder: ReferenceHolder) -> Self {
        match holder {
            ReferenceHolder::Free => FfiReferenceHolder::Free,
            ReferenceHolder::Patient { patient_id } => FfiReferenceHolder::Patient { patient_id },
            ReferenceHolder::Visits { patient_id } => FfiReferenceHolder::Visits { patient_id },
        }
    }
}

/// FFI-safe patient filters. Blank strings are ignored.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiPatientFilters {
    pub sex: Option<String>,
    pub civil_status: Option<String>,
    pub age_min: Option<u32>,
    pub age_max: Option<u32>,
    pub last_visit_start: Option<String>,
    pub last_visit_end: Option<String>,
    pub registered_start: Option<String>,
    pub registered_end: Option<String>,
    pub last_name_prefix: Option<String>,
}

impl From<FfiPatientFilters> for PatientFilters {
    fn from(filters: FfiPatientFilters) -> Self {
        PatientFilters {
            sex: filters.sex,
            civil_status: filters.civil_status,
            age_min: filters.age_min,
            age_max: filters.age_max,
            last_visit: DateRange {
                start: filters.last_visit_start,
                end: filters.last_visit_end,
            },
            registered: DateRange {
                start: filters.registered_start,
                end: filters.registered_end,
            },
            last_name_prefix: filters.last_name_prefix,
        }
    }
}

/// FFI-safe page of patient search rows.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientPage {
    pub rows: Vec<FfiPatientSummary>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
}

impl From<Page<PatientSummary>> for FfiPatientPage {
    fn from(page: Page<PatientSummary>) -> Self {
        Self {
            total_pages: page.total_pages(),
            rows: page.rows.into_iter().map(|r| r.into()).collect(),
            total: page.total,
            page: page.page,
            per_page: page.per_page,
        }
    }
}

/// FFI-safe page of patients.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientListPage {
    pub rows: Vec<FfiPatient>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
}

impl From<Page<Patient>> for FfiPatientListPage {
    fn from(page: Page<Patient>) -> Self {
        Self {
            total_pages: page.total_pages(),
            rows: page.rows.into_iter().map(|r| r.into()).collect(),
            total: page.total,
            page: page.page,
            per_page: page.per_page,
        }
    }
}

/// FFI-safe page of the visit log.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisitPage {
    pub rows: Vec<FfiVisitWithPatient>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
}

impl From<Page<VisitWithPatient>> for FfiVisitPage {
    fn from(page: Page<VisitWithPatient>) -> Self {
        Self {
            total_pages: page.total_pages(),
            rows: page.rows.into_iter().map(|r| r.into()).collect(),
            total: page.total,
            page: page.page,
            per_page: page.per_page,
        }
    }
}

/// FFI-safe page of one patient's visits.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientVisitPage {
    pub rows: Vec<FfiVisit>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
}

impl From<Page<Visit>> for FfiPatientVisitPage {
    fn from(page: Page<Visit>) -> Self {
        Self {
            total_pages: page.total_pages(),
            rows: page.rows.into_iter().map(|r| r.into()).collect(),
            total: page.total,
            page: page.page,
            per_page: page.per_page,
        }
    }
}

/// FFI-safe merge report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMergeReport {
    pub patients_added: u32,
    pub patients_skipped: u32,
    pub visits_added: u32,
    pub visits_skipped: u32,
    pub errors: Vec<String>,
}

impl From<MergeReport> for FfiMergeReport {
    fn from(report: MergeReport) -> Self {
        Self {
            patients_added: report.patients_added,
            patients_skipped: report.patients_skipped,
            visits_added: report.visits_added,
            visits_skipped: report.visits_skipped,
            errors: report.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient_input(last: &str, first: &str, reference: Option<i64>) -> FfiPatientInput {
        FfiPatientInput {
            reference_number: reference,
            last_name: last.into(),
            first_name: first.into(),
            middle_name: None,
            date_of_birth: None,
            sex: Some("Male".into()),
            civil_status: None,
            occupation: None,
            parents: None,
            parent_contact: None,
            school: None,
            contact_number: None,
            address: None,
            notes: None,
        }
    }

    fn visit_input(date: &str, reference: Option<i64>) -> FfiVisitInput {
        FfiVisitInput {
            visit_date: date.into(),
            visit_time: Some("09:00".into()),
            weight_kg: None,
            height_cm: None,
            blood_pressure: None,
            temperature_celsius: None,
            medical_notes: None,
            reference_number: reference,
            visit_type: FfiVisitType::New,
        }
    }

    #[test]
    fn test_core_register_and_visit() {
        let core = open_database_in_memory().unwrap();
        let patient = core.create_patient(patient_input("Cruz", "Juan", None)).unwrap();
        assert_eq!(patient.reference_number, Some(1));
        assert_eq!(patient.full_name, "Cruz, Juan");

        let visit = core
            .add_visit(patient.patient_id, visit_input("2024-01-10", None))
            .unwrap();
        assert_eq!(visit.reference_number, 1);
        assert_eq!(visit.visit_time, Some("09:00:00".into()));
        assert_eq!(core.next_reference_number().unwrap(), 2);
    }

    #[test]
    fn test_core_error_kinds() {
        let core = open_database_in_memory().unwrap();
        let a = core.create_patient(patient_input("A", "One", Some(100))).unwrap();

        assert!(matches!(
            core.create_patient(patient_input("B", "Two", Some(100))),
            Err(ClinicError::ConstraintViolation(_))
        ));
        assert!(matches!(
            core.create_patient(patient_input(" ", "Two", None)),
            Err(ClinicError::InvalidArgument(_))
        ));
        assert!(matches!(
            core.add_visit(999, visit_input("2024-01-10", None)),
            Err(ClinicError::NotFound(_))
        ));
        assert!(matches!(
            core.merge_patients(a.patient_id, a.patient_id),
            Err(ClinicError::InvalidArgument(_))
        ));
        assert!(matches!(
            core.backup(None),
            Err(ClinicError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_core_reference_holder_and_reparenting() {
        let core = open_database_in_memory().unwrap();
        let a = core.create_patient(patient_input("A", "One", Some(100))).unwrap();
        let b = core.create_patient(patient_input("B", "Two", Some(200))).unwrap();
        let visit = core.add_visit(a.patient_id, visit_input("2024-01-10", None)).unwrap();

        assert_eq!(
            core.reference_holder(200).unwrap(),
            FfiReferenceHolder::Patient {
                patient_id: b.patient_id
            }
        );

        assert!(core
            .update_visit(visit.visit_id, visit_input("2024-01-10", Some(200)))
            .unwrap());
        let moved = core.get_visit(visit.visit_id).unwrap().unwrap();
        assert_eq!(moved.visit.patient_id, b.patient_id);
        assert_eq!(moved.display_reference, 200);
        assert!(core.get_patient_visits(a.patient_id).unwrap().is_empty());
    }

    #[test]
    fn test_core_filtered_page() {
        let core = open_database_in_memory().unwrap();
        for i in 0..12 {
            core.create_patient(patient_input("Cruz", &format!("Juan{}", i), None))
                .unwrap();
        }
        let filters = FfiPatientFilters {
            sex: Some("Male".into()),
            ..Default::default()
        };
        let page = core
            .search_patients_filtered("cruz".into(), filters, 2, 10)
            .unwrap();
        assert_eq!(page.total, 12);
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.total_pages, 2);
    }

    #[test]
    fn test_reference_formatting_exports() {
        assert_eq!(format_reference_number(125), "00-01-25");
        assert_eq!(parse_reference_number("00-01-25".into()), Some(125));
        assert_eq!(parse_reference_number("abc".into()), None);
    }
}

//! Merging another store file into this one.
//!
//! Patients are matched by reference number, or by name and birth date when
//! the source patient has none. Matched patients are not inserted again, and
//! a visit is skipped when its patient already has one at the same date and
//! time, so merging the same file twice adds nothing the second time.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::{patient_from_row, table_columns, Database, DbError, DbResult};
use crate::models::Patient;

/// Outcome of [`Database::merge_database`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    pub patients_added: u32,
    pub patients_skipped: u32,
    pub visits_added: u32,
    pub visits_skipped: u32,
    /// One message per row that could not be merged
    pub errors: Vec<String>,
}

impl MergeReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Source patient columns, in the order [`patient_from_row`] reads them.
const SOURCE_PATIENT_COLUMNS: [&str; 16] = [
    "patient_id",
    "reference_number",
    "last_name",
    "first_name",
    "middle_name",
    "date_of_birth",
    "sex",
    "civil_status",
    "occupation",
    "parents",
    "parent_contact",
    "school",
    "contact_number",
    "address",
    "notes",
    "registered_date",
];

const SOURCE_VISIT_COLUMNS: [&str; 12] = [
    "patient_id",
    "reference_number",
    "visit_date",
    "visit_time",
    "weight_kg",
    "height_cm",
    "blood_pressure",
    "temperature_celsius",
    "medical_notes",
    "created_at",
    "modified_at",
    "visit_type",
];

/// A visit row as read from the source store.
struct SourceVisit {
    patient_id: i64,
    reference_number: Option<i64>,
    visit_date: Option<String>,
    visit_time: Option<String>,
    weight_kg: Option<f64>,
    height_cm: Option<f64>,
    blood_pressure: Option<String>,
    temperature_celsius: Option<f64>,
    medical_notes: Option<String>,
    created_at: Option<String>,
    modified_at: Option<String>,
    visit_type: Option<String>,
}

impl SourceVisit {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            patient_id: row.get(0)?,
            reference_number: row.get(1)?,
            visit_date: row.get(2)?,
            visit_time: row.get(3)?,
            weight_kg: row.get(4)?,
            height_cm: row.get(5)?,
            blood_pressure: row.get(6)?,
            temperature_celsius: row.get(7)?,
            medical_notes: row.get(8)?,
            created_at: row.get(9)?,
            modified_at: row.get(10)?,
            visit_type: row.get(11)?,
        })
    }
}

/// `SELECT` over `columns`, reading any the table lacks as NULL.
fn tolerant_select(table: &str, columns: &[&str], present: &HashSet<String>) -> String {
    let list: Vec<String> = columns
        .iter()
        .map(|column| {
            if present.contains(*column) {
                column.to_string()
            } else {
                format!("NULL AS {}", column)
            }
        })
        .collect();
    format!("SELECT {} FROM {}", list.join(", "), table)
}

fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn read_source_patients(source: &Connection) -> DbResult<Vec<Patient>> {
    let columns = table_columns(source, "patients")?;
    for required in ["patient_id", "last_name", "first_name"] {
        if !columns.contains(required) {
            return Err(DbError::InvalidArgument(format!(
                "source patients table has no {} column",
                required
            )));
        }
    }
    let mut stmt = source.prepare(&format!(
        "{} ORDER BY patient_id",
        tolerant_select("patients", &SOURCE_PATIENT_COLUMNS, &columns)
    ))?;
    let rows = stmt.query_map([], patient_from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

fn read_source_visits(source: &Connection) -> DbResult<Vec<SourceVisit>> {
    if !table_exists(source, "visit_logs")? {
        return Ok(Vec::new());
    }
    let columns = table_columns(source, "visit_logs")?;
    let order = if columns.contains("visit_id") {
        " ORDER BY visit_id"
    } else {
        ""
    };
    let mut stmt = source.prepare(&format!(
        "{}{}",
        tolerant_select("visit_logs", &SOURCE_VISIT_COLUMNS, &columns),
        order
    ))?;
    let rows = stmt.query_map([], SourceVisit::from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Local patient the source patient already corresponds to, if any.
fn find_local_match(conn: &Connection, patient: &Patient) -> DbResult<Option<i64>> {
    let found = match patient.reference_number {
        Some(reference) => conn
            .query_row(
                "SELECT patient_id FROM patients WHERE reference_number = ?",
                [reference],
                |row| row.get(0),
            )
            .optional()?,
        None => conn
            .query_row(
                r#"
                SELECT patient_id FROM patients
                WHERE last_name = ?1 AND first_name = ?2
                  AND middle_name IS ?3 AND date_of_birth IS ?4
                ORDER BY patient_id
                LIMIT 1
                "#,
                params![
                    patient.last_name,
                    patient.first_name,
                    patient.middle_name,
                    patient.date_of_birth
                ],
                |row| row.get(0),
            )
            .optional()?,
    };
    Ok(found)
}

fn insert_patient(conn: &Connection, patient: &Patient) -> DbResult<i64> {
    conn.execute(
        r#"
        INSERT INTO patients (
            reference_number, last_name, first_name, middle_name, date_of_birth,
            sex, civil_status, occupation, parents, parent_contact, school,
            contact_number, address, notes, registered_date
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
        params![
            patient.reference_number,
            patient.last_name,
            patient.first_name,
            patient.middle_name,
            patient.date_of_birth,
            patient.sex,
            patient.civil_status,
            patient.occupation,
            patient.parents,
            patient.parent_contact,
            patient.school,
            patient.contact_number,
            patient.address,
            patient.notes,
            patient.registered_date,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn is_duplicate_visit(conn: &Connection, patient_id: i64, visit: &SourceVisit) -> DbResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            r#"
            SELECT 1 FROM visit_logs
            WHERE patient_id = ?1 AND visit_date = ?2 AND visit_time IS ?3
            LIMIT 1
            "#,
            params![patient_id, visit.visit_date, visit.visit_time],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn insert_visit(
    conn: &Connection,
    patient_id: i64,
    reference_number: i64,
    visit: &SourceVisit,
) -> DbResult<()> {
    conn.execute(
        r#"
        INSERT INTO visit_logs (
            patient_id, reference_number, visit_date, visit_time, weight_kg,
            height_cm, blood_pressure, temperature_celsius, medical_notes,
            created_at, modified_at, visit_type
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, COALESCE(?12, 'new'))
        "#,
        params![
            patient_id,
            reference_number,
            visit.visit_date,
            visit.visit_time,
            visit.weight_kg,
            visit.height_cm,
            visit.blood_pressure,
            visit.temperature_celsius,
            visit.medical_notes,
            visit.created_at,
            visit.modified_at,
            visit.visit_type,
        ],
    )?;
    Ok(())
}

impl Database {
    /// Merge the patients and visits of another store file into this one.
    ///
    /// The source is opened read-only and never migrated. Failing to read it
    /// is an error; a row that cannot be merged is recorded in the report
    /// and the merge carries on.
    pub fn merge_database(&self, source_path: &Path) -> DbResult<MergeReport> {
        let (patients, visits) = {
            let source = Database::open_read_only_connection(source_path)?;
            if !table_exists(&source, "patients")? {
                return Err(DbError::InvalidArgument(format!(
                    "{} has no patients table",
                    source_path.display()
                )));
            }
            (read_source_patients(&source)?, read_source_visits(&source)?)
        };

        let mut report = MergeReport::default();
        let mut patient_map: HashMap<i64, (i64, Option<i64>)> = HashMap::new();
        let tx = self.begin()?;

        for patient in &patients {
            if let Some(local_id) = find_local_match(&tx, patient)? {
                let local_reference = tx.query_row(
                    "SELECT reference_number FROM patients WHERE patient_id = ?",
                    [local_id],
                    |row| row.get(0),
                )?;
                patient_map.insert(patient.patient_id, (local_id, local_reference));
                report.patients_skipped += 1;
                continue;
            }
            match insert_patient(&tx, patient) {
                Ok(local_id) => {
                    patient_map.insert(patient.patient_id, (local_id, patient.reference_number));
                    report.patients_added += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        source_patient_id = patient.patient_id,
                        error = %e,
                        "Skipping patient during merge"
                    );
                    report.patients_skipped += 1;
                    report.errors.push(format!(
                        "Patient {} ({}): {}",
                        patient.full_name(),
                        patient
                            .reference_number
                            .map(|r| format!("ref #{}", r))
                            .unwrap_or_else(|| "no ref".into()),
                        e
                    ));
                }
            }
        }

        for visit in &visits {
            let Some(&(local_id, local_reference)) = patient_map.get(&visit.patient_id) else {
                report.visits_skipped += 1;
                continue;
            };
            if is_duplicate_visit(&tx, local_id, visit)? {
                report.visits_skipped += 1;
                continue;
            }
            let result = match visit.reference_number.or(local_reference) {
                Some(reference) => insert_visit(&tx, local_id, reference, visit),
                None => Err(DbError::InvalidArgument(
                    "visit has no reference number".into(),
                )),
            };
            match result {
                Ok(()) => report.visits_added += 1,
                Err(e) => {
                    tracing::warn!(
                        source_patient_id = visit.patient_id,
                        error = %e,
                        "Skipping visit during merge"
                    );
                    report.visits_skipped += 1;
                    report.errors.push(format!(
                        "Visit on {}: {}",
                        visit.visit_date.as_deref().unwrap_or("unknown date"),
                        e
                    ));
                }
            }
        }

        tx.commit()?;
        tracing::info!(
            source = %source_path.display(),
            patients_added = report.patients_added,
            patients_skipped = report.patients_skipped,
            visits_added = report.visits_added,
            visits_skipped = report.visits_skipped,
            errors = report.errors.len(),
            "Merged store"
        );
        Ok(report)
    }
}

//! Visit log database operations.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::patients::get_patient_in;
use super::references::{next_reference_in, reference_holder_in};
use super::{Database, DbError, DbResult};
use crate::models::{
    now_timestamp, validate_date, Visit, VisitInput, VisitType,
    VisitWithPatient,
};

/// Visit columns, in the order [`visit_from_row`] reads them.
/// Queries alias `visit_logs` as `v`.
pub(crate) const VISIT_SELECT: &str = r#"
    v.visit_id, v.patient_id, v.reference_number, v.visit_date, v.visit_time,
    v.weight_kg, v.height_cm, v.blood_pressure, v.temperature_celsius,
    v.medical_notes, v.created_at, v.modified_at, v.visit_type
"#;

/// Visit columns followed by the owning patient's identifying columns.
/// Queries join `patients p ON v.patient_id = p.patient_id`.
pub(crate) const VISIT_WITH_PATIENT_SELECT: &str = r#"
    v.visit_id, v.patient_id, v.reference_number, v.visit_date, v.visit_time,
    v.weight_kg, v.height_cm, v.blood_pressure, v.temperature_celsius,
    v.medical_notes, v.created_at, v.modified_at, v.visit_type,
    p.reference_number, p.last_name, p.first_name, p.middle_name, p.date_of_birth
"#;

pub(crate) fn visit_from_row(row: &Row<'_>) -> rusqlite::Result<Visit> {
    let visit_type: Option<String> = row.get(12)?;
    Ok(Visit {
        visit_id: row.get(0)?,
        patient_id: row.get(1)?,
        reference_number: row.get(2)?,
        visit_date: row.get(3)?,
        visit_time: row.get(4)?,
        weight_kg: row.get(5)?,
        height_cm: row.get(6)?,
        blood_pressure: row.get(7)?,
        temperature_celsius: row.get(8)?,
        medical_notes: row.get(9)?,
        created_at: row.get(10)?,
        modified_at: row.get(11)?,
        visit_type: VisitType::from_db(visit_type.as_deref()),
    })
}

pub(crate) fn visit_with_patient_from_row(row: &Row<'_>) -> rusqlite::Result<VisitWithPatient> {
    Ok(VisitWithPatient {
        visit: visit_from_row(row)?,
        patient_reference_number: row.get(13)?,
        last_name: row.get(14)?,
        first_name: row.get(15)?,
        middle_name: row.get(16)?,
        date_of_birth: row.get(17)?,
    })
}

fn get_visit_row_in(conn: &Connection, visit_id: i64) -> DbResult<Option<Visit>> {
    conn.query_row(
        &format!("SELECT {} FROM visit_logs v WHERE v.visit_id = ?", VISIT_SELECT),
        [visit_id],
        visit_from_row,
    )
    .optional()
    .map_err(Into::into)
}

impl Database {
    /// Log a visit for a patient.
    ///
    /// Without an explicit reference number the visit uses the patient's. A
    /// patient without one is given the next free number first.
    pub fn add_visit(&self, patient_id: i64, input: &VisitInput) -> DbResult<Visit> {
        let input = input.normalized()?;
        let tx = self.begin()?;

        let patient = get_patient_in(&tx, patient_id)?
            .ok_or_else(|| DbError::NotFound(format!("patient {}", patient_id)))?;

        let reference_number = match (input.reference_number, patient.reference_number) {
            (Some(reference), _) => {
                if let Some(owner) = reference_holder_in(&tx, reference)?.owner() {
                    if owner != patient_id {
                        return Err(DbError::Constraint(format!(
                            "reference number {} belongs to patient {}",
                            reference, owner
                        )));
                    }
                }
                reference
            }
            (None, Some(reference)) => reference,
            (None, None) => {
                let allocated = next_reference_in(&tx)?;
                tx.execute(
                    "UPDATE patients SET reference_number = ? WHERE patient_id = ?",
                    params![allocated, patient_id],
                )?;
                tracing::debug!(patient_id, allocated, "Allocated reference for patient");
                allocated
            }
        };

        tx.execute(
            r#"
            INSERT INTO visit_logs (
                patient_id, reference_number, visit_date, visit_time, weight_kg,
                height_cm, blood_pressure, temperature_celsius, medical_notes,
                created_at, visit_type
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                patient_id,
                reference_number,
                input.visit_date,
                input.visit_time,
                input.weight_kg,
                input.height_cm,
                input.blood_pressure,
                input.temperature_celsius,
                input.medical_notes,
                now_timestamp(),
                input.visit_type.as_str(),
            ],
        )?;
        let visit_id = tx.last_insert_rowid();
        let visit = get_visit_row_in(&tx, visit_id)?
            .ok_or_else(|| DbError::NotFound(format!("visit {}", visit_id)))?;
        tx.commit()?;
        Ok(visit)
    }

    /// Replace a visit's editable fields.
    ///
    /// Changing the reference number to one a different patient holds, or
    /// that only its visits carry, moves the visit to that patient. Returns
    /// `false` when no such visit exists.
    pub fn update_visit(&self, visit_id: i64, input: &VisitInput) -> DbResult<bool> {
        let input = input.normalized()?;
        let tx = self.begin()?;

        let Some(current) = get_visit_row_in(&tx, visit_id)? else {
            return Ok(false);
        };

        let reference_number = input.reference_number.unwrap_or(current.reference_number);
        let mut patient_id = current.patient_id;
        if reference_number != current.reference_number {
            if let Some(holder) = reference_holder_in(&tx, reference_number)?.owner() {
                if holder != current.patient_id {
                    tracing::info!(
                        visit_id,
                        from = current.patient_id,
                        to = holder,
                        reference_number,
                        "Visit follows reference number to another patient"
                    );
                }
                patient_id = holder;
            }
        }

        let rows_affected = tx.execute(
            r#"
            UPDATE visit_logs SET
                patient_id = ?2,
                reference_number = ?3,
                visit_date = ?4,
                visit_time = ?5,
                weight_kg = ?6,
                height_cm = ?7,
                blood_pressure = ?8,
                temperature_celsius = ?9,
                medical_notes = ?10,
                modified_at = ?11
            WHERE visit_id = ?1
            "#,
            params![
                visit_id,
                patient_id,
                reference_number,
                input.visit_date,
                input.visit_time,
                input.weight_kg,
                input.height_cm,
                input.blood_pressure,
                input.temperature_celsius,
                input.medical_notes,
                now_timestamp(),
            ],
        )?;
        tx.commit()?;
        Ok(rows_affected > 0)
    }

    /// Get a visit with its patient's names.
    pub fn get_visit(&self, visit_id: i64) -> DbResult<Option<VisitWithPatient>> {
        self.conn
            .query_row(
                &format!(
                    r#"
                    SELECT {}
                    FROM visit_logs v
                    JOIN patients p ON v.patient_id = p.patient_id
                    WHERE v.visit_id = ?
                    "#,
                    VISIT_WITH_PATIENT_SELECT
                ),
                [visit_id],
                visit_with_patient_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Most recent visit logged under a reference number.
    pub fn get_visit_by_reference(
        &self,
        reference_number: i64,
    ) -> DbResult<Option<VisitWithPatient>> {
        self.conn
            .query_row(
                &format!(
                    r#"
                    SELECT {}
                    FROM visit_logs v
                    JOIN patients p ON v.patient_id = p.patient_id
                    WHERE v.reference_number = ?
                    ORDER BY v.visit_date DESC, v.visit_time DESC, v.visit_id DESC
                    LIMIT 1
                    "#,
                    VISIT_WITH_PATIENT_SELECT
                ),
                [reference_number],
                visit_with_patient_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// All visits on one day, newest reference number first.
    pub fn get_visits_by_date(&self, visit_date: &str) -> DbResult<Vec<VisitWithPatient>> {
        validate_date("visit_date", visit_date)?;
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM visit_logs v
            JOIN patients p ON v.patient_id = p.patient_id
            WHERE v.visit_date = ?
            ORDER BY v.reference_number DESC, v.visit_time DESC, v.visit_id DESC
            "#,
            VISIT_WITH_PATIENT_SELECT
        ))?;
        let rows = stmt.query_map([visit_date], visit_with_patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// All visits of one patient, newest first.
    pub fn get_patient_visits(&self, patient_id: i64) -> DbResult<Vec<Visit>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM visit_logs v
            WHERE v.patient_id = ?
            ORDER BY v.reference_number DESC, v.visit_date DESC, v.visit_time DESC, v.visit_id DESC
            "#,
            VISIT_SELECT
        ))?;
        let rows = stmt.query_map([patient_id], visit_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Every visit with patient names, newest reference number first.
    pub fn list_visits(&self) -> DbResult<Vec<VisitWithPatient>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM visit_logs v
            JOIN patients p ON v.patient_id = p.patient_id
            ORDER BY v.reference_number DESC, v.visit_date DESC, v.visit_id DESC
            "#,
            VISIT_WITH_PATIENT_SELECT
        ))?;
        let rows = stmt.query_map([], visit_with_patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Total number of visits.
    pub fn visit_count(&self) -> DbResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM visit_logs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Visit date of the most recently entered back-dated visit, so the
    /// encoding screen can resume where staff left off.
    pub fn last_encoded_visit_date(&self) -> DbResult<Option<String>> {
        self.conn
            .query_row(
                r#"
                SELECT visit_date FROM visit_logs
                WHERE visit_type = 'encode'
                ORDER BY created_at DESC, visit_id DESC
                LIMIT 1
                "#,
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }
}

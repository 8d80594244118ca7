//! Patient database operations.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::references::{next_reference_in, reference_holder_in};
use super::{Database, DbError, DbResult};
use crate::models::{now_timestamp, Patient, PatientInput, PatientStats, ReferenceHolder};

/// Patient columns, in the order [`patient_from_row`] reads them.
/// Queries alias `patients` as `p`.
pub(crate) const PATIENT_SELECT: &str = r#"
    p.patient_id, p.reference_number, p.last_name, p.first_name, p.middle_name,
    p.date_of_birth, p.sex, p.civil_status, p.occupation, p.parents,
    p.parent_contact, p.school, p.contact_number, p.address, p.notes,
    p.registered_date
"#;

/// Number of columns in [`PATIENT_SELECT`].
pub(crate) const PATIENT_SELECT_LEN: usize = 16;

pub(crate) fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        patient_id: row.get(0)?,
        reference_number: row.get(1)?,
        last_name: row.get(2)?,
        first_name: row.get(3)?,
        middle_name: row.get(4)?,
        date_of_birth: row.get(5)?,
        sex: row.get(6)?,
        civil_status: row.get(7)?,
        occupation: row.get(8)?,
        parents: row.get(9)?,
        parent_contact: row.get(10)?,
        school: row.get(11)?,
        contact_number: row.get(12)?,
        address: row.get(13)?,
        notes: row.get(14)?,
        registered_date: row.get(15)?,
    })
}

pub(crate) fn get_patient_in(conn: &Connection, patient_id: i64) -> DbResult<Option<Patient>> {
    conn.query_row(
        &format!("SELECT {} FROM patients p WHERE p.patient_id = ?", PATIENT_SELECT),
        [patient_id],
        patient_from_row,
    )
    .optional()
    .map_err(Into::into)
}

impl Database {
    /// Register a new patient.
    ///
    /// Without an explicit reference number the next free one is allocated.
    /// Allocation and insert run in one transaction; the unique index and
    /// ownership triggers are the final word on conflicts.
    pub fn create_patient(&self, input: &PatientInput) -> DbResult<Patient> {
        let input = input.normalized()?;
        let tx = self.begin()?;

        let reference_number = match input.reference_number {
            Some(n) => n,
            None => next_reference_in(&tx)?,
        };

        tx.execute(
            r#"
            INSERT INTO patients (
                reference_number, last_name, first_name, middle_name, date_of_birth,
                sex, civil_status, occupation, parents, parent_contact, school,
                contact_number, address, notes, registered_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                reference_number,
                input.last_name,
                input.first_name,
                input.middle_name,
                input.date_of_birth,
                input.sex,
                input.civil_status,
                input.occupation,
                input.parents,
                input.parent_contact,
                input.school,
                input.contact_number,
                input.address,
                input.notes,
                now_timestamp(),
            ],
        )?;
        let patient_id = tx.last_insert_rowid();
        let patient = get_patient_in(&tx, patient_id)?
            .ok_or_else(|| DbError::NotFound(format!("patient {}", patient_id)))?;
        tx.commit()?;

        tracing::debug!(patient_id, reference_number, "Registered patient");
        Ok(patient)
    }

    /// Replace a patient's editable fields.
    ///
    /// A new reference number that another patient holds is rejected; the
    /// caller decides whether to merge instead. When the number changes, the
    /// patient's visits that carried the old number follow it.
    /// Returns `false` when no such patient exists.
    pub fn update_patient(&self, patient_id: i64, input: &PatientInput) -> DbResult<bool> {
        let input = input.normalized()?;
        let tx = self.begin()?;

        let Some(current) = get_patient_in(&tx, patient_id)? else {
            return Ok(false);
        };

        let reference_number = input.reference_number.or(current.reference_number);
        if let Some(new_ref) = input.reference_number {
            if Some(new_ref) != current.reference_number {
                if let ReferenceHolder::Patient { patient_id: holder } =
                    reference_holder_in(&tx, new_ref)?
                {
                    return Err(DbError::Constraint(format!(
                        "reference number {} belongs to patient {}",
                        new_ref, holder
                    )));
                }
            }
        }

        tx.execute(
            r#"
            UPDATE patients SET
                reference_number = ?2,
                last_name = ?3,
                first_name = ?4,
                middle_name = ?5,
                date_of_birth = ?6,
                sex = ?7,
                civil_status = ?8,
                occupation = ?9,
                parents = ?10,
                parent_contact = ?11,
                school = ?12,
                contact_number = ?13,
                address = ?14,
                notes = ?15
            WHERE patient_id = ?1
            "#,
            params![
                patient_id,
                reference_number,
                input.last_name,
                input.first_name,
                input.middle_name,
                input.date_of_birth,
                input.sex,
                input.civil_status,
                input.occupation,
                input.parents,
                input.parent_contact,
                input.school,
                input.contact_number,
                input.address,
                input.notes,
            ],
        )?;

        if let (Some(old_ref), Some(new_ref)) = (current.reference_number, reference_number) {
            if old_ref != new_ref {
                let moved = tx.execute(
                    r#"
                    UPDATE visit_logs SET reference_number = ?1, modified_at = ?2
                    WHERE patient_id = ?3 AND reference_number = ?4
                    "#,
                    params![new_ref, now_timestamp(), patient_id, old_ref],
                )?;
                tracing::info!(
                    patient_id,
                    old_ref,
                    new_ref,
                    visits = moved,
                    "Renumbered patient"
                );
            }
        }

        tx.commit()?;
        Ok(true)
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, patient_id: i64) -> DbResult<Option<Patient>> {
        get_patient_in(&self.conn, patient_id)
    }

    /// Get a patient by reference number.
    pub fn get_patient_by_reference(&self, reference_number: i64) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM patients p WHERE p.reference_number = ?",
                    PATIENT_SELECT
                ),
                [reference_number],
                patient_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// List all patients by last name, first name.
    pub fn list_patients(&self) -> DbResult<Vec<Patient>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM patients p ORDER BY p.last_name, p.first_name, p.patient_id",
            PATIENT_SELECT
        ))?;
        let rows = stmt.query_map([], patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Total number of patients.
    pub fn patient_count(&self) -> DbResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Delete a patient. Their visits go with them.
    pub fn delete_patient(&self, patient_id: i64) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM patients WHERE patient_id = ?", [patient_id])?;
        if rows_affected > 0 {
            tracing::info!(patient_id, "Deleted patient");
        }
        Ok(rows_affected > 0)
    }

    /// Visit count and first/last visit dates for a patient.
    pub fn get_patient_stats(&self, patient_id: i64) -> DbResult<PatientStats> {
        self.conn
            .query_row(
                r#"
                SELECT COUNT(*), MIN(visit_date), MAX(visit_date)
                FROM visit_logs
                WHERE patient_id = ?
                "#,
                [patient_id],
                |row| {
                    Ok(PatientStats {
                        total_visits: row.get(0)?,
                        first_visit: row.get(1)?,
                        last_visit: row.get(2)?,
                    })
                },
            )
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VisitInput;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let db = setup_db();

        let mut input = PatientInput::new("Cruz", "Juan");
        input.sex = Some("Male".into());
        input.date_of_birth = Some("1990-03-15".into());
        input.middle_name = Some("".into());

        let patient = db.create_patient(&input).unwrap();
        assert_eq!(patient.reference_number, Some(1));
        assert!(patient.registered_date.is_some());

        let retrieved = db.get_patient(patient.patient_id).unwrap().unwrap();
        assert_eq!(retrieved.last_name, "Cruz");
        assert_eq!(retrieved.sex, Some("Male".into()));
        assert_eq!(retrieved.middle_name, None);
        assert_eq!(retrieved, patient);
    }

    #[test]
    fn test_create_rejects_invalid_input() {
        let db = setup_db();
        let err = db.create_patient(&PatientInput::new("", "Juan")).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument(_)));
        assert_eq!(db.patient_count().unwrap(), 0);
    }

    #[test]
    fn test_create_with_taken_reference() {
        let db = setup_db();
        let mut input = PatientInput::new("Cruz", "Juan");
        input.reference_number = Some(50);
        db.create_patient(&input).unwrap();

        let mut other = PatientInput::new("Reyes", "Ana");
        other.reference_number = Some(50);
        let err = db.create_patient(&other).unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)), "got {:?}", err);
        assert_eq!(db.patient_count().unwrap(), 1);
    }

    #[test]
    fn test_update_patient() {
        let db = setup_db();
        let patient = db.create_patient(&PatientInput::new("Cruz", "Juan")).unwrap();

        let mut input = PatientInput::new("Cruz", "Juan");
        input.address = Some("Iloilo City".into());
        assert!(db.update_patient(patient.patient_id, &input).unwrap());

        let retrieved = db.get_patient(patient.patient_id).unwrap().unwrap();
        assert_eq!(retrieved.address, Some("Iloilo City".into()));
        // Reference number unchanged when not supplied
        assert_eq!(retrieved.reference_number, Some(1));
        assert_eq!(retrieved.registered_date, patient.registered_date);

        assert!(!db.update_patient(9999, &input).unwrap());
    }

    #[test]
    fn test_renumber_moves_visits() {
        let db = setup_db();
        let patient = db.create_patient(&PatientInput::new("Cruz", "Juan")).unwrap();
        db.add_visit(patient.patient_id, &VisitInput::new("2024-01-10", "09:00:00"))
            .unwrap();

        let mut input = PatientInput::new("Cruz", "Juan");
        input.reference_number = Some(120);
        assert!(db.update_patient(patient.patient_id, &input).unwrap());

        let visits = db.get_patient_visits(patient.patient_id).unwrap();
        assert_eq!(visits.len(), 1);
        assert_eq!(visits[0].reference_number, 120);
        assert!(db.is_reference_available(1).unwrap());
    }

    #[test]
    fn test_renumber_to_other_patients_reference_rejected() {
        let db = setup_db();
        let a = db.create_patient(&PatientInput::new("Cruz", "Juan")).unwrap();
        let b = db.create_patient(&PatientInput::new("Reyes", "Ana")).unwrap();

        let mut input = PatientInput::new("Cruz", "Juan");
        input.reference_number = b.reference_number;
        let err = db.update_patient(a.patient_id, &input).unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));

        let unchanged = db.get_patient(a.patient_id).unwrap().unwrap();
        assert_eq!(unchanged.reference_number, a.reference_number);
    }

    #[test]
    fn test_get_by_reference() {
        let db = setup_db();
        let patient = db.create_patient(&PatientInput::new("Cruz", "Juan")).unwrap();

        let found = db.get_patient_by_reference(1).unwrap().unwrap();
        assert_eq!(found.patient_id, patient.patient_id);
        assert!(db.get_patient_by_reference(2).unwrap().is_none());
    }

    #[test]
    fn test_list_patients_sorted() {
        let db = setup_db();
        db.create_patient(&PatientInput::new("Reyes", "Ana")).unwrap();
        db.create_patient(&PatientInput::new("Cruz", "Juan")).unwrap();
        db.create_patient(&PatientInput::new("Cruz", "Andres")).unwrap();

        let names: Vec<_> = db
            .list_patients()
            .unwrap()
            .into_iter()
            .map(|p| p.full_name())
            .collect();
        assert_eq!(names, vec!["Cruz, Andres", "Cruz, Juan", "Reyes, Ana"]);
    }

    #[test]
    fn test_delete_cascades_visits() {
        let db = setup_db();
        let patient = db.create_patient(&PatientInput::new("Cruz", "Juan")).unwrap();
        db.add_visit(patient.patient_id, &VisitInput::new("2024-01-10", "09:00:00"))
            .unwrap();
        db.add_visit(patient.patient_id, &VisitInput::new("2024-02-10", "10:00:00"))
            .unwrap();

        assert!(db.delete_patient(patient.patient_id).unwrap());
        assert!(db.get_patient_visits(patient.patient_id).unwrap().is_empty());
        assert_eq!(db.visit_count().unwrap(), 0);
        assert!(!db.delete_patient(patient.patient_id).unwrap());
    }

    #[test]
    fn test_patient_stats() {
        let db = setup_db();
        let patient = db.create_patient(&PatientInput::new("Cruz", "Juan")).unwrap();
        assert_eq!(
            db.get_patient_stats(patient.patient_id).unwrap(),
            PatientStats::default()
        );

        db.add_visit(patient.patient_id, &VisitInput::new("2024-03-01", "09:00:00"))
            .unwrap();
        db.add_visit(patient.patient_id, &VisitInput::new("2024-01-10", "09:00:00"))
            .unwrap();

        let stats = db.get_patient_stats(patient.patient_id).unwrap();
        assert_eq!(stats.total_visits, 2);
        assert_eq!(stats.first_visit, Some("2024-01-10".into()));
        assert_eq!(stats.last_visit, Some("2024-03-01".into()));
    }
}

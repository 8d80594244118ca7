//! Reference number allocation and patient/visit reassignment.
//!
//! A reference number held by a patient may appear only on that patient's
//! visits. The schema triggers enforce this on every write; the functions here
//! pick numbers and move visits so that writes satisfy it.

use rusqlite::{params, Connection, OptionalExtension};

use super::patients::get_patient_in;
use super::{Database, DbError, DbResult};
use crate::models::{now_timestamp, ReferenceHolder};

/// `1 + max(reference_number)` over patients and visits, 1 on an empty store.
pub(crate) fn next_reference_in(conn: &Connection) -> DbResult<i64> {
    // Each MAX is answered from its index
    let max: Option<i64> = conn.query_row(
        r#"
        SELECT MAX(ref) FROM (
            SELECT MAX(reference_number) AS ref FROM visit_logs
            UNION ALL
            SELECT MAX(reference_number) AS ref FROM patients
        )
        "#,
        [],
        |row| row.get(0),
    )?;
    Ok(max.unwrap_or(0) + 1)
}

pub(crate) fn reference_holder_in(conn: &Connection, reference_number: i64) -> DbResult<ReferenceHolder> {
    let patient: Option<i64> = conn
        .query_row(
            "SELECT patient_id FROM patients WHERE reference_number = ?",
            [reference_number],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(patient_id) = patient {
        return Ok(ReferenceHolder::Patient { patient_id });
    }

    let visit_owner: Option<i64> = conn
        .query_row(
            "SELECT patient_id FROM visit_logs WHERE reference_number = ? LIMIT 1",
            [reference_number],
            |row| row.get(0),
        )
        .optional()?;
    Ok(match visit_owner {
        Some(patient_id) => ReferenceHolder::Visits { patient_id },
        None => ReferenceHolder::Free,
    })
}

/// Point every visit of `from` at `to`, stamping `reference_number` on them
/// when given. Returns the number of visits moved.
fn move_visits_in(
    conn: &Connection,
    from: i64,
    to: i64,
    reference_number: Option<i64>,
) -> DbResult<usize> {
    let moved = match reference_number {
        Some(reference) => conn.execute(
            r#"
            UPDATE visit_logs SET patient_id = ?1, reference_number = ?2, modified_at = ?3
            WHERE patient_id = ?4
            "#,
            params![to, reference, now_timestamp(), from],
        )?,
        None => conn.execute(
            "UPDATE visit_logs SET patient_id = ?1, modified_at = ?2 WHERE patient_id = ?3",
            params![to, now_timestamp(), from],
        )?,
    };
    Ok(moved)
}

impl Database {
    /// Next unused reference number.
    pub fn next_reference_number(&self) -> DbResult<i64> {
        next_reference_in(&self.conn)
    }

    /// True iff no patient and no visit holds the number.
    pub fn is_reference_available(&self, reference_number: i64) -> DbResult<bool> {
        Ok(self.reference_holder(reference_number)?.is_free())
    }

    /// Who holds a reference number. The allocator only reports; callers
    /// decide whether to overwrite, merge or cancel.
    pub fn reference_holder(&self, reference_number: i64) -> DbResult<ReferenceHolder> {
        reference_holder_in(&self.conn, reference_number)
    }

    /// Move all visits of `old_patient_id` to `new_patient_id`.
    ///
    /// Moved visits take the new patient's reference number when it has one.
    /// If it has none, visits keep their numbers, which fails with a
    /// constraint violation when the old patient still holds them.
    pub fn reassign_visits(&self, old_patient_id: i64, new_patient_id: i64) -> DbResult<usize> {
        let tx = self.begin()?;
        let target = get_patient_in(&tx, new_patient_id)?
            .ok_or_else(|| DbError::NotFound(format!("patient {}", new_patient_id)))?;

        let moved = move_visits_in(&tx, old_patient_id, new_patient_id, target.reference_number)?;
        tx.commit()?;

        tracing::info!(
            from = old_patient_id,
            to = new_patient_id,
            visits = moved,
            "Reassigned visits"
        );
        Ok(moved)
    }

    /// Merge `source_id` into `target_id`: the source's visits move to the
    /// target under the target's reference number, then the source is deleted.
    ///
    /// A target without a reference number adopts the source's. Either the
    /// whole merge commits or nothing changes.
    pub fn merge_patients(&self, source_id: i64, target_id: i64) -> DbResult<()> {
        if source_id == target_id {
            return Err(DbError::InvalidArgument(
                "cannot merge a patient into itself".into(),
            ));
        }

        let tx = self.begin()?;
        let source = get_patient_in(&tx, source_id)?
            .ok_or_else(|| DbError::NotFound(format!("patient {}", source_id)))?;
        let target = get_patient_in(&tx, target_id)?
            .ok_or_else(|| DbError::NotFound(format!("patient {}", target_id)))?;

        let reference_number = match (target.reference_number, source.reference_number) {
            (Some(reference), _) => Some(reference),
            (None, Some(adopted)) => {
                // Release the number before the visits carrying it change owner
                tx.execute(
                    "UPDATE patients SET reference_number = NULL WHERE patient_id = ?",
                    [source_id],
                )?;
                Some(adopted)
            }
            (None, None) => None,
        };

        let moved = move_visits_in(&tx, source_id, target_id, reference_number)?;

        if target.reference_number.is_none() {
            if let Some(adopted) = reference_number {
                tx.execute(
                    "UPDATE patients SET reference_number = ? WHERE patient_id = ?",
                    params![adopted, target_id],
                )?;
            }
        }

        let deleted = tx.execute("DELETE FROM patients WHERE patient_id = ?", [source_id])?;
        if deleted == 0 {
            return Err(DbError::NotFound(format!("patient {}", source_id)));
        }
        tx.commit()?;

        tracing::info!(
            source_id,
            target_id,
            visits = moved,
            reference_number = ?reference_number,
            "Merged patients"
        );
        Ok(())
    }
}

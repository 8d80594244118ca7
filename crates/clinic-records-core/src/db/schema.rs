//! SQLite schema definition and versioned migrations.
//!
//! Migrations are additive only. Each runs once and is recorded in
//! `schema_version`; stores written before versioning existed start at 0 and
//! are brought forward by the same list.

use rusqlite::Connection;
use std::collections::HashSet;

use super::{DbError, DbResult};

/// Base tables.
const CREATE_TABLES: &str = r#"
-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    patient_id INTEGER PRIMARY KEY AUTOINCREMENT,
    reference_number INTEGER,                    -- unique among patients, see triggers
    last_name TEXT NOT NULL,
    first_name TEXT NOT NULL,
    middle_name TEXT,
    date_of_birth TEXT,                          -- YYYY-MM-DD
    sex TEXT,
    civil_status TEXT,
    occupation TEXT,
    parents TEXT,
    parent_contact TEXT,
    school TEXT,
    contact_number TEXT,
    address TEXT,
    notes TEXT,
    registered_date TEXT DEFAULT CURRENT_TIMESTAMP
);

-- ============================================================================
-- Visit Logs
-- ============================================================================

CREATE TABLE IF NOT EXISTS visit_logs (
    visit_id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id INTEGER NOT NULL,
    reference_number INTEGER NOT NULL,           -- shared by all visits of a patient
    visit_date TEXT NOT NULL,                    -- YYYY-MM-DD
    visit_time TEXT,                             -- HH:MM:SS
    weight_kg REAL,
    height_cm REAL,
    blood_pressure TEXT,
    temperature_celsius REAL,
    medical_notes TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    modified_at TEXT,
    visit_type TEXT DEFAULT 'new',               -- new, encode
    FOREIGN KEY (patient_id) REFERENCES patients(patient_id) ON DELETE CASCADE
);

-- ============================================================================
-- Admin Users
-- ============================================================================

CREATE TABLE IF NOT EXISTS admin_users (
    admin_id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Lookup indices.
const CREATE_INDICES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_patient_first_name ON patients(first_name);
CREATE INDEX IF NOT EXISTS idx_patient_last_name ON patients(last_name);
CREATE INDEX IF NOT EXISTS idx_patient_dob ON patients(date_of_birth);
CREATE UNIQUE INDEX IF NOT EXISTS idx_patient_unique_ref ON patients(reference_number);

CREATE INDEX IF NOT EXISTS idx_visit_date ON visit_logs(visit_date);
CREATE INDEX IF NOT EXISTS idx_patient_visits ON visit_logs(patient_id);
CREATE INDEX IF NOT EXISTS idx_reference_number ON visit_logs(reference_number);

-- Older stores enforced one visit per reference number
DROP INDEX IF EXISTS idx_unique_reference;
"#;

/// Give reference-less patients the earliest number found on their visits.
/// Rows that would collide with another patient's number stay NULL.
const BACKFILL_PATIENT_REFERENCES: &str = r#"
UPDATE OR IGNORE patients
SET reference_number = (
    SELECT MIN(reference_number)
    FROM visit_logs
    WHERE visit_logs.patient_id = patients.patient_id
)
WHERE reference_number IS NULL;
"#;

/// A number held by a patient may only appear on that patient's visits.
const CREATE_REFERENCE_TRIGGERS: &str = r#"
CREATE TRIGGER IF NOT EXISTS patients_reference_insert BEFORE INSERT ON patients
WHEN new.reference_number IS NOT NULL
BEGIN
    SELECT RAISE(ABORT, 'reference number is already used by another patient''s visits')
    WHERE EXISTS (
        SELECT 1 FROM visit_logs WHERE reference_number = new.reference_number
    );
END;

CREATE TRIGGER IF NOT EXISTS patients_reference_update BEFORE UPDATE OF reference_number ON patients
WHEN new.reference_number IS NOT NULL
BEGIN
    SELECT RAISE(ABORT, 'reference number is already used by another patient''s visits')
    WHERE EXISTS (
        SELECT 1 FROM visit_logs
        WHERE reference_number = new.reference_number
          AND patient_id != new.patient_id
    );
END;

CREATE TRIGGER IF NOT EXISTS visit_logs_reference_insert BEFORE INSERT ON visit_logs
BEGIN
    SELECT RAISE(ABORT, 'reference number belongs to a different patient')
    WHERE EXISTS (
        SELECT 1 FROM patients
        WHERE reference_number = new.reference_number
          AND patient_id != new.patient_id
    );
END;

CREATE TRIGGER IF NOT EXISTS visit_logs_reference_update
BEFORE UPDATE OF reference_number, patient_id ON visit_logs
BEGIN
    SELECT RAISE(ABORT, 'reference number belongs to a different patient')
    WHERE EXISTS (
        SELECT 1 FROM patients
        WHERE reference_number = new.reference_number
          AND patient_id != new.patient_id
    );
END;
"#;

/// Visits carrying a number no patient holds all belong to one patient.
/// Edits that keep a visit's number and owner are not checked, so rows older
/// stores wrote under another patient's number stay editable.
const TIGHTEN_VISIT_REFERENCE_TRIGGERS: &str = r#"
DROP TRIGGER IF EXISTS visit_logs_reference_insert;
DROP TRIGGER IF EXISTS visit_logs_reference_update;

CREATE TRIGGER visit_logs_reference_insert BEFORE INSERT ON visit_logs
BEGIN
    SELECT RAISE(ABORT, 'reference number belongs to a different patient')
    WHERE EXISTS (
        SELECT 1 FROM patients
        WHERE reference_number = new.reference_number
          AND patient_id != new.patient_id
    )
    OR (
        NOT EXISTS (
            SELECT 1 FROM patients WHERE reference_number = new.reference_number
        )
        AND EXISTS (
            SELECT 1 FROM visit_logs
            WHERE reference_number = new.reference_number
              AND patient_id != new.patient_id
        )
    );
END;

-- Visits left on old.patient_id are moved by the same statement
CREATE TRIGGER visit_logs_reference_update
BEFORE UPDATE OF reference_number, patient_id ON visit_logs
WHEN new.reference_number IS NOT old.reference_number
  OR new.patient_id IS NOT old.patient_id
BEGIN
    SELECT RAISE(ABORT, 'reference number belongs to a different patient')
    WHERE EXISTS (
        SELECT 1 FROM patients
        WHERE reference_number = new.reference_number
          AND patient_id != new.patient_id
    )
    OR (
        NOT EXISTS (
            SELECT 1 FROM patients WHERE reference_number = new.reference_number
        )
        AND EXISTS (
            SELECT 1 FROM visit_logs
            WHERE reference_number = new.reference_number
              AND patient_id NOT IN (new.patient_id, old.patient_id)
              AND visit_id != new.visit_id
        )
    );
END;
"#;

/// Columns every current store has, with the type used when adding them to
/// an older store. Added columns cannot carry non-constant defaults.
const PATIENT_COLUMNS: &[(&str, &str)] = &[
    ("reference_number", "INTEGER"),
    ("middle_name", "TEXT"),
    ("date_of_birth", "TEXT"),
    ("sex", "TEXT"),
    ("civil_status", "TEXT"),
    ("occupation", "TEXT"),
    ("parents", "TEXT"),
    ("parent_contact", "TEXT"),
    ("school", "TEXT"),
    ("contact_number", "TEXT"),
    ("address", "TEXT"),
    ("notes", "TEXT"),
    ("registered_date", "TEXT"),
];

const VISIT_COLUMNS: &[(&str, &str)] = &[
    ("visit_time", "TEXT"),
    ("weight_kg", "REAL"),
    ("height_cm", "REAL"),
    ("blood_pressure", "TEXT"),
    ("temperature_celsius", "REAL"),
    ("medical_notes", "TEXT"),
    ("created_at", "TEXT"),
    ("modified_at", "TEXT"),
    ("visit_type", "TEXT DEFAULT 'new'"),
];

enum Step {
    Sql(&'static str),
    Code(fn(&Connection) -> DbResult<()>),
}

struct Migration {
    version: i64,
    description: &'static str,
    step: Step,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create tables",
        step: Step::Sql(CREATE_TABLES),
    },
    Migration {
        version: 2,
        description: "add columns missing from older stores",
        step: Step::Code(add_missing_columns),
    },
    Migration {
        version: 3,
        description: "create indices",
        step: Step::Sql(CREATE_INDICES),
    },
    Migration {
        version: 4,
        description: "backfill patient reference numbers",
        step: Step::Sql(BACKFILL_PATIENT_REFERENCES),
    },
    Migration {
        version: 5,
        description: "reference ownership triggers",
        step: Step::Sql(CREATE_REFERENCE_TRIGGERS),
    },
    Migration {
        version: 6,
        description: "visit-only reference ownership",
        step: Step::Sql(TIGHTEN_VISIT_REFERENCE_TRIGGERS),
    },
];

/// Version the newest migration brings a store to.
pub const LATEST_SCHEMA_VERSION: i64 = 6;

/// Apply every migration newer than the store's recorded version.
pub fn run_migrations(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );",
    )?;
    let current = schema_version(conn)?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tracing::info!(
            version = migration.version,
            "Running migration: {}",
            migration.description
        );
        apply(conn, migration).map_err(|e| DbError::Migration {
            version: migration.version,
            reason: e.to_string(),
        })?;
    }

    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> DbResult<()> {
    let tx = conn.unchecked_transaction()?;
    match migration.step {
        Step::Sql(sql) => tx.execute_batch(sql)?,
        Step::Code(f) => f(&tx)?,
    }
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?)",
        [migration.version],
    )?;
    tx.commit()?;
    Ok(())
}

/// Current schema version (0 for a new or pre-versioning store).
pub fn schema_version(conn: &Connection) -> DbResult<i64> {
    let version: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

/// Column names of a table, empty if the table does not exist.
pub(crate) fn table_columns(conn: &Connection, table: &str) -> DbResult<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    names.collect::<Result<_, _>>().map_err(Into::into)
}

fn add_missing_columns(conn: &Connection) -> DbResult<()> {
    for (table, columns) in [("patients", PATIENT_COLUMNS), ("visit_logs", VISIT_COLUMNS)] {
        let existing = table_columns(conn, table)?;
        for (name, decl) in columns {
            if !existing.contains(*name) {
                tracing::info!(table, column = name, "Adding missing column");
                conn.execute_batch(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, name, decl))?;
            }
        }
    }
    Ok(())
}

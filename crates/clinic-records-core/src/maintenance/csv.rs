//! CSV export of the visit log.

use std::fs;
use std::path::Path;

use rusqlite::types::Value;

use crate::db::{Database, DbResult};

/// Header row of the visit export.
pub const CSV_HEADER: [&str; 21] = [
    "Patient ID",
    "Last Name",
    "First Name",
    "Middle Name",
    "DOB",
    "Sex",
    "Occupation",
    "Parents",
    "Parent Contact",
    "School",
    "Contact",
    "Address",
    "Visit ID",
    "Date",
    "Time",
    "Weight (kg)",
    "Height (cm)",
    "BP",
    "Temp (°C)",
    "Notes",
    "Timestamp",
];

const EXPORT_QUERY: &str = r#"
    SELECT
        p.patient_id, p.last_name, p.first_name, p.middle_name,
        p.date_of_birth, p.sex, p.occupation, p.parents, p.parent_contact, p.school,
        p.contact_number, p.address,
        v.visit_id, v.visit_date, v.visit_time, v.weight_kg, v.height_cm,
        v.blood_pressure, v.temperature_celsius, v.medical_notes, v.created_at
    FROM visit_logs v
    JOIN patients p ON v.patient_id = p.patient_id
    ORDER BY v.visit_date DESC, v.visit_time DESC, v.visit_id DESC
"#;

/// Visit log exporter.
pub struct CsvExporter<'a> {
    db: &'a Database,
}

impl<'a> CsvExporter<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// One formatted line per visit, newest first.
    fn lines(&self) -> DbResult<Vec<String>> {
        let mut stmt = self.db.conn().prepare(EXPORT_QUERY)?;
        let rows = stmt.query_map([], |row| {
            let mut cells = Vec::with_capacity(CSV_HEADER.len());
            for i in 0..CSV_HEADER.len() {
                cells.push(format_cell(row.get::<_, Value>(i)?));
            }
            Ok(cells.join(","))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn document(&self) -> DbResult<(String, usize)> {
        let lines = self.lines()?;
        let mut csv = CSV_HEADER.join(",");
        csv.push('\n');
        for line in &lines {
            csv.push_str(line);
            csv.push('\n');
        }
        Ok((csv, lines.len()))
    }

    /// The full document: header plus one row per visit.
    pub fn render(&self) -> DbResult<String> {
        Ok(self.document()?.0)
    }

    /// Write the document to `path`. Returns the number of visit rows.
    pub fn write_to(&self, path: &Path) -> DbResult<usize> {
        let (csv, rows) = self.document()?;
        fs::write(path, csv)?;
        tracing::info!(path = %path.display(), rows, "Exported visits to CSV");
        Ok(rows)
    }
}

impl Database {
    /// Export every visit with its patient to a UTF-8 CSV file.
    pub fn export_csv(&self, path: &Path) -> DbResult<usize> {
        CsvExporter::new(self).write_to(path)
    }
}

fn format_cell(value: Value) -> String {
    match value {
        Value::Null | Value::Blob(_) => String::new(),
        Value::Integer(n) => n.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => escape_csv(&s),
    }
}

/// Escape a string for CSV output.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

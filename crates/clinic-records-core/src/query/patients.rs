//! Patient search.

use chrono::NaiveDate;
use rusqlite::{Connection, Row};

use super::{
    born_on_or_before, like_escape, validated_filters, Page, PageRequest, PatientFilters,
    Predicate,
};
use crate::db::{patient_from_row, Database, DbResult, PATIENT_SELECT, PATIENT_SELECT_LEN};
use crate::models::{Patient, PatientSummary};

/// Rows returned by a plain text search.
pub const SEARCH_LIMIT: u32 = 50;

/// Rows returned by an empty search.
pub const RECENT_LIMIT: u32 = 20;

const LAST_VISIT_SQL: &str =
    "(SELECT MAX(lv.visit_date) FROM visit_logs lv WHERE lv.patient_id = p.patient_id)";

const VISIT_COUNT_SQL: &str =
    "(SELECT COUNT(*) FROM visit_logs vc WHERE vc.patient_id = p.patient_id)";

fn summary_select() -> String {
    format!(
        "SELECT {}, {} AS last_visit, {} AS visit_count FROM patients p",
        PATIENT_SELECT, LAST_VISIT_SQL, VISIT_COUNT_SQL
    )
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<PatientSummary> {
    Ok(PatientSummary {
        patient: patient_from_row(row)?,
        last_visit: row.get(PATIENT_SELECT_LEN)?,
        visit_count: row.get(PATIENT_SELECT_LEN + 1)?,
    })
}

fn patient_predicate(
    query: &str,
    filters: &PatientFilters,
    today: NaiveDate,
) -> DbResult<Predicate> {
    let filters = validated_filters(filters)?;
    let mut predicate = Predicate::default();
    predicate.push_text_match(query);

    if let Some(sex) = filters.sex {
        predicate.push_with("p.sex = ?", sex);
    }
    if let Some(civil_status) = filters.civil_status {
        predicate.push_with("p.civil_status = ?", civil_status);
    }

    // NULL birth dates fail both comparisons
    if let Some(age_min) = filters.age_min {
        let latest = born_on_or_before(today, age_min)?;
        predicate.push_with(
            "p.date_of_birth <= ?",
            latest.format("%Y-%m-%d").to_string(),
        );
    }
    if let Some(age_max) = filters.age_max {
        let earliest = born_on_or_before(today, age_max.saturating_add(1))?;
        predicate.push_with(
            "p.date_of_birth > ?",
            earliest.format("%Y-%m-%d").to_string(),
        );
    }

    predicate.push_date_range(LAST_VISIT_SQL, &filters.last_visit);

    if let Some(start) = &filters.registered.start {
        predicate.push_with("p.registered_date >= ?", format!("{} 00:00:00", start));
    }
    if let Some(end) = &filters.registered.end {
        predicate.push_with("p.registered_date <= ?", format!("{} 23:59:59", end));
    }

    if let Some(prefix) = filters.last_name_prefix {
        predicate.push_with(
            "p.last_name LIKE ? ESCAPE '\\'",
            format!("{}%", like_escape(&prefix)),
        );
    }
    Ok(predicate)
}

pub(crate) fn search_filtered_in(
    conn: &Connection,
    query: &str,
    filters: &PatientFilters,
    page: PageRequest,
    today: NaiveDate,
) -> DbResult<Page<PatientSummary>> {
    let predicate = patient_predicate(query, filters, today)?;
    let total = predicate.count(conn, "FROM patients p")?;
    let rows = predicate.fetch_page(
        conn,
        &summary_select(),
        "p.registered_date DESC, p.last_name, p.first_name, p.patient_id DESC",
        page,
        summary_from_row,
    )?;
    Ok(Page::new(rows, total, page))
}

impl Database {
    /// Quick search by name or reference number.
    ///
    /// A blank query lists the most recently visited patients instead.
    pub fn search_patients(&self, query: &str) -> DbResult<Vec<PatientSummary>> {
        let mut predicate = Predicate::default();
        if query.trim().is_empty() {
            return predicate.fetch_page(
                &self.conn,
                &summary_select(),
                "last_visit IS NULL, last_visit DESC, p.patient_id DESC",
                PageRequest::new(1, RECENT_LIMIT as i64),
                summary_from_row,
            );
        }

        predicate.push_text_match(query);
        predicate.fetch_page(
            &self.conn,
            &summary_select(),
            "p.last_name, p.first_name, p.patient_id",
            PageRequest::new(1, SEARCH_LIMIT as i64),
            summary_from_row,
        )
    }

    /// Text search ANDed with filters, one page at a time.
    ///
    /// A page past the end is empty and still carries the total.
    pub fn search_patients_filtered(
        &self,
        query: &str,
        filters: &PatientFilters,
        page: PageRequest,
    ) -> DbResult<Page<PatientSummary>> {
        let today = chrono::Local::now().date_naive();
        search_filtered_in(&self.conn, query, filters, page, today)
    }

    /// All patients by name, one page at a time.
    pub fn get_patients_paginated(&self, page: PageRequest) -> DbResult<Page<Patient>> {
        let predicate = Predicate::default();
        let total = predicate.count(&self.conn, "FROM patients p")?;
        let rows = predicate.fetch_page(
            &self.conn,
            &format!("SELECT {} FROM patients p", PATIENT_SELECT),
            "p.last_name, p.first_name, p.patient_id DESC",
            page,
            patient_from_row,
        )?;
        Ok(Page::new(rows, total, page))
    }
}

//! Visit log pagination.

use super::{DateRange, Page, PageRequest, Predicate};
use crate::db::{
    visit_from_row, visit_with_patient_from_row, Database, DbResult, VISIT_SELECT,
    VISIT_WITH_PATIENT_SELECT,
};
use crate::models::{Visit, VisitWithPatient};

const VISITS_FROM: &str = "FROM visit_logs v JOIN patients p ON v.patient_id = p.patient_id";

impl Database {
    /// Visit log page, newest first, filtered by patient name or reference
    /// number and by an inclusive visit-date range.
    pub fn get_visits_paginated(
        &self,
        page: PageRequest,
        query: &str,
        dates: &DateRange,
    ) -> DbResult<Page<VisitWithPatient>> {
        let dates = dates.validated("visit_date")?;
        let mut predicate = Predicate::default();
        predicate.push_text_match(query);
        predicate.push_date_range("v.visit_date", &dates);

        let total = predicate.count(&self.conn, VISITS_FROM)?;
        let rows = predicate.fetch_page(
            &self.conn,
            &format!("SELECT {} {}", VISIT_WITH_PATIENT_SELECT, VISITS_FROM),
            "v.visit_date DESC, v.visit_time DESC, v.reference_number DESC, v.visit_id DESC",
            page,
            visit_with_patient_from_row,
        )?;
        Ok(Page::new(rows, total, page))
    }

    /// One patient's visits, highest reference number first.
    pub fn get_patient_visits_paginated(
        &self,
        patient_id: i64,
        page: PageRequest,
        dates: &DateRange,
    ) -> DbResult<Page<Visit>> {
        let dates = dates.validated("visit_date")?;
        let mut predicate = Predicate::default();
        predicate.push_with("v.patient_id = ?", patient_id);
        predicate.push_date_range("v.visit_date", &dates);

        let total = predicate.count(&self.conn, "FROM visit_logs v")?;
        let rows = predicate.fetch_page(
            &self.conn,
            &format!("SELECT {} FROM visit_logs v", VISIT_SELECT),
            "v.reference_number DESC, v.visit_date DESC, v.visit_time DESC, v.visit_id DESC",
            page,
            visit_from_row,
        )?;
        Ok(Page::new(rows, total, page))
    }
}

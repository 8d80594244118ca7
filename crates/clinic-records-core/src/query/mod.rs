//! Filtered, paginated search over patients and visits.
//!
//! Every search builds one predicate and uses it twice: once under
//! `COUNT(*)` for the total and once with `LIMIT/OFFSET` for the rows, so the
//! two always agree.

mod patients;
mod visits;

#[allow(unused_imports)]
pub use patients::*;
#[allow(unused_imports)]
pub use visits::*;

use chrono::{Months, NaiveDate};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::{DbError, DbResult};
use crate::models::{reference_search_digits, validate_date};

/// 1-indexed page request. Values below 1 are clamped to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.clamp(1, u32::MAX as i64) as u32,
            per_page: per_page.clamp(1, u32::MAX as i64) as u32,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, per_page: 10 }
    }
}

/// One page of results plus the total across all pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub(crate) fn new(rows: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            rows,
            total,
            page: request.page,
            per_page: request.per_page,
        }
    }

    /// Number of pages needed to hold `total` rows; 0 when there are none.
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(self.per_page.max(1) as u64)
    }
}

/// Inclusive `YYYY-MM-DD` range; either end may be open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl DateRange {
    pub fn new(start: Option<&str>, end: Option<&str>) -> Self {
        Self {
            start: start.map(str::to_string),
            end: end.map(str::to_string),
        }
    }

    pub fn is_open(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    fn validated(&self, field: &'static str) -> DbResult<Self> {
        let check = |value: &Option<String>| -> DbResult<Option<String>> {
            match value.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                Some(date) => {
                    validate_date(field, date)?;
                    Ok(Some(date.to_string()))
                }
                None => Ok(None),
            }
        };
        Ok(Self {
            start: check(&self.start)?,
            end: check(&self.end)?,
        })
    }
}

/// Optional patient filters, ANDed together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientFilters {
    pub sex: Option<String>,
    pub civil_status: Option<String>,
    /// Minimum age in whole years, inclusive
    pub age_min: Option<u32>,
    /// Maximum age in whole years, inclusive
    pub age_max: Option<u32>,
    /// Range over each patient's most recent visit date
    pub last_visit: DateRange,
    /// Range over the registration date
    pub registered: DateRange,
    /// Last-name prefix, usually a single letter
    pub last_name_prefix: Option<String>,
}

/// WHERE clauses and their bound values, built up filter by filter.
#[derive(Default)]
pub(crate) struct Predicate {
    conditions: Vec<String>,
    params: Vec<Box<dyn rusqlite::ToSql>>,
}

impl Predicate {
    pub(crate) fn push_with<T: rusqlite::ToSql + 'static>(
        &mut self,
        condition: impl Into<String>,
        value: T,
    ) {
        self.conditions.push(condition.into());
        self.params.push(Box::new(value));
    }

    /// `WHERE a AND b ...`, or an empty string with no conditions.
    pub(crate) fn where_sql(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    fn param_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }

    /// `COUNT(*)` over `from` (a FROM/JOIN clause) under this predicate.
    pub(crate) fn count(&self, conn: &Connection, from: &str) -> DbResult<u64> {
        let sql = format!("SELECT COUNT(*) {} {}", from, self.where_sql());
        let param_refs = self.param_refs();
        let total: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
        Ok(total as u64)
    }

    /// One page of `select` (a SELECT ... FROM ... clause) in `order_by` order.
    pub(crate) fn fetch_page<T, F>(
        &self,
        conn: &Connection,
        select: &str,
        order_by: &str,
        page: PageRequest,
        map: F,
    ) -> DbResult<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let sql = format!(
            "{} {} ORDER BY {} LIMIT ? OFFSET ?",
            select,
            self.where_sql(),
            order_by
        );
        let limit = page.limit();
        let offset = page.offset();
        let mut param_refs = self.param_refs();
        param_refs.push(&limit);
        param_refs.push(&offset);

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), map)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Case-insensitive substring match on any name, or on the reference
    /// number's digits. Blank text adds nothing.
    pub(crate) fn push_text_match(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let pattern = like_pattern(text);
        let mut clause = String::from(
            "(p.first_name LIKE ? ESCAPE '\\' OR p.middle_name LIKE ? ESCAPE '\\' OR p.last_name LIKE ? ESCAPE '\\'",
        );
        for _ in 0..3 {
            self.params.push(Box::new(pattern.clone()));
        }
        if let Some(digits) = reference_search_digits(text) {
            clause.push_str(" OR CAST(p.reference_number AS TEXT) LIKE ?");
            self.params.push(Box::new(format!("%{}%", digits)));
        }
        clause.push(')');
        self.conditions.push(clause);
    }

    /// Inclusive range on a `YYYY-MM-DD` column.
    pub(crate) fn push_date_range(&mut self, column: &str, range: &DateRange) {
        if let Some(start) = &range.start {
            self.push_with(format!("{} >= ?", column), start.clone());
        }
        if let Some(end) = &range.end {
            self.push_with(format!("{} <= ?", column), end.clone());
        }
    }
}

/// `text` with LIKE wildcards escaped by `\`.
pub(crate) fn like_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `%text%` with LIKE wildcards in `text` escaped.
pub(crate) fn like_pattern(text: &str) -> String {
    format!("%{}%", like_escape(text))
}

/// Latest birth date for someone at least `age` years old on `today`.
pub(crate) fn born_on_or_before(today: NaiveDate, age: u32) -> DbResult<NaiveDate> {
    today
        .checked_sub_months(Months::new(age.saturating_mul(12)))
        .ok_or_else(|| DbError::InvalidArgument(format!("age {} is out of range", age)))
}

pub(crate) fn validated_filters(filters: &PatientFilters) -> DbResult<PatientFilters> {
    if let (Some(min), Some(max)) = (filters.age_min, filters.age_max) {
        if min > max {
            return Err(DbError::InvalidArgument(format!(
                "age_min {} is greater than age_max {}",
                min, max
            )));
        }
    }
    Ok(PatientFilters {
        sex: crate::models::blank_to_none(&filters.sex),
        civil_status: crate::models::blank_to_none(&filters.civil_status),
        age_min: filters.age_min,
        age_max: filters.age_max,
        last_visit: filters.last_visit.validated("last_visit")?,
        registered: filters.registered.validated("registered")?,
        last_name_prefix: crate::models::blank_to_none(&filters.last_name_prefix),
    })
}

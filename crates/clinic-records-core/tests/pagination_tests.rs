//! Pagination integration tests.

use std::collections::HashSet;

use clinic_records_core::db::Database;
use clinic_records_core::models::{PatientInput, VisitInput};
use clinic_records_core::query::{DateRange, PageRequest, PatientFilters};
use proptest::prelude::*;

fn seed(db: &Database, sexes: &[bool]) {
    for (i, male) in sexes.iter().enumerate() {
        let mut input = PatientInput::new(if i % 3 == 0 { "Cruz" } else { "Reyes" }, format!("P{}", i));
        input.sex = Some(if *male { "Male" } else { "Female" }.into());
        let patient = db.create_patient(&input).unwrap();
        for day in 0..(i % 3) {
            db.add_visit(
                patient.patient_id,
                &VisitInput::new(format!("2024-03-{:02}", day + 1), "09:00"),
            )
            .unwrap();
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_patient_pages_cover_every_match_once(
        sexes in prop::collection::vec(any::<bool>(), 0..30),
        per_page in 1i64..8,
        only_males in any::<bool>(),
    ) {
        let db = Database::open_in_memory().unwrap();
        seed(&db, &sexes);

        let filters = PatientFilters {
            sex: only_males.then(|| "Male".to_string()),
            ..Default::default()
        };
        let expected = sexes.iter().filter(|m| !only_males || **m).count() as u64;

        let first = db
            .search_patients_filtered("", &filters, PageRequest::new(1, per_page))
            .unwrap();
        prop_assert_eq!(first.total, expected);

        let mut seen = HashSet::new();
        for page in 1..=first.total_pages() {
            let result = db
                .search_patients_filtered("", &filters, PageRequest::new(page as i64, per_page))
                .unwrap();
            prop_assert_eq!(result.total, expected);
            for row in result.rows {
                prop_assert!(seen.insert(row.patient.patient_id), "duplicate row");
            }
        }
        prop_assert_eq!(seen.len() as u64, expected);

        let past_end = db
            .search_patients_filtered(
                "",
                &filters,
                PageRequest::new(first.total_pages() as i64 + 1, per_page),
            )
            .unwrap();
        prop_assert!(past_end.rows.is_empty());
        prop_assert_eq!(past_end.total, expected);
    }

    #[test]
    fn prop_visit_pages_cover_every_visit_once(
        sexes in prop::collection::vec(any::<bool>(), 0..30),
        per_page in 1i64..8,
    ) {
        let db = Database::open_in_memory().unwrap();
        seed(&db, &sexes);
        let expected = db.visit_count().unwrap();

        let first = db
            .get_visits_paginated(PageRequest::new(1, per_page), "", &DateRange::default())
            .unwrap();
        prop_assert_eq!(first.total, expected);

        let mut seen = HashSet::new();
        for page in 1..=first.total_pages() {
            let result = db
                .get_visits_paginated(
                    PageRequest::new(page as i64, per_page),
                    "",
                    &DateRange::default(),
                )
                .unwrap();
            for row in result.rows {
                prop_assert!(seen.insert(row.visit.visit_id), "duplicate row");
            }
        }
        prop_assert_eq!(seen.len() as u64, expected);
    }
}

#[test]
fn test_zero_and_negative_page_sizes_are_clamped() {
    let db = Database::open_in_memory().unwrap();
    seed(&db, &[true, true, false]);

    let page = db
        .search_patients_filtered("", &PatientFilters::default(), PageRequest::new(0, 0))
        .unwrap();
    assert_eq!(page.page, 1);
    assert_eq!(page.per_page, 1);
    assert_eq!(page.rows.len(), 1);
    assert_eq!(page.total, 3);
}

#[test]
fn test_date_ranges_are_inclusive() {
    let db = Database::open_in_memory().unwrap();
    seed(&db, &[true, true, true]);
    // Patient 1 visits on the 1st, patient 2 on the 1st and 2nd

    let range = DateRange::new(Some("2024-03-02"), Some("2024-03-02"));
    let page = db
        .get_visits_paginated(PageRequest::new(1, 10), "", &range)
        .unwrap();
    assert_eq!(page.total, 1);

    let filters = PatientFilters {
        last_visit: DateRange::new(Some("2024-03-01"), Some("2024-03-01")),
        ..Default::default()
    };
    let page = db
        .search_patients_filtered("", &filters, PageRequest::new(1, 10))
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.rows[0].patient.first_name, "P1");
}

//! Reference number integration tests.

use clinic_records_core::db::{Database, DbError};
use clinic_records_core::models::{PatientInput, ReferenceHolder, VisitInput};

fn patient(db: &Database, last: &str, reference: Option<i64>) -> i64 {
    let mut input = PatientInput::new(last, "Test");
    input.reference_number = reference;
    db.create_patient(&input).unwrap().patient_id
}

/// Every number traces to at most one patient: no two patients share one, a
/// patient's number appears only on its own visits, and a number carried only
/// by visits is carried by one patient's visits.
fn assert_reference_ownership(db: &Database) {
    let duplicated: i64 = db
        .conn()
        .query_row(
            r#"
            SELECT COUNT(*) FROM (
                SELECT reference_number FROM patients
                WHERE reference_number IS NOT NULL
                GROUP BY reference_number HAVING COUNT(*) > 1
            )
            "#,
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(duplicated, 0, "two patients share a reference number");

    let foreign: i64 = db
        .conn()
        .query_row(
            r#"
            SELECT COUNT(*) FROM visit_logs v
            JOIN patients p ON p.reference_number = v.reference_number
            WHERE p.patient_id <> v.patient_id
            "#,
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(foreign, 0, "a visit carries another patient's number");

    let split: i64 = db
        .conn()
        .query_row(
            r#"
            SELECT COUNT(*) FROM (
                SELECT reference_number FROM visit_logs
                GROUP BY reference_number HAVING COUNT(DISTINCT patient_id) > 1
            )
            "#,
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(split, 0, "visits of different patients share a number");
}

#[test]
fn test_register_then_visit_scenario() {
    let db = Database::open_in_memory().unwrap();

    let juan = db.create_patient(&PatientInput::new("Cruz", "Juan")).unwrap();
    assert_eq!(juan.reference_number, Some(1));

    let visit = db
        .add_visit(juan.patient_id, &VisitInput::new("2024-01-10", "09:00:00"))
        .unwrap();
    assert_eq!(visit.reference_number, 1);
    assert_eq!(db.next_reference_number().unwrap(), 2);
}

#[test]
fn test_allocator_floor_rises_past_inserted_numbers() {
    let db = Database::open_in_memory().unwrap();
    assert_eq!(db.next_reference_number().unwrap(), 1);

    for n in [5, 3, 250, 12] {
        patient(&db, "P", Some(n));
        assert!(db.next_reference_number().unwrap() > n);
    }
    assert_eq!(db.next_reference_number().unwrap(), 251);
}

#[test]
fn test_conflicting_writes_are_constraint_violations() {
    let db = Database::open_in_memory().unwrap();
    let a = patient(&db, "A", Some(100));
    let b = patient(&db, "B", Some(200));

    // Registration under a taken number
    let mut input = PatientInput::new("C", "Test");
    input.reference_number = Some(100);
    assert!(matches!(
        db.create_patient(&input).unwrap_err(),
        DbError::Constraint(_)
    ));

    // Renumbering onto another patient's number
    let mut edit = PatientInput::new("A", "Test");
    edit.reference_number = Some(200);
    assert!(matches!(
        db.update_patient(a, &edit).unwrap_err(),
        DbError::Constraint(_)
    ));

    // Logging a visit under another patient's number
    let mut visit = VisitInput::new("2024-01-10", "09:00");
    visit.reference_number = Some(200);
    assert!(matches!(
        db.add_visit(a, &visit).unwrap_err(),
        DbError::Constraint(_)
    ));

    // Registering someone under a number only visits carry
    db.add_visit(b, &VisitInput::new("2024-01-10", "09:00")).unwrap();
    let mut visit = VisitInput::new("2024-01-11", "09:00");
    visit.reference_number = Some(300);
    db.add_visit(b, &visit).unwrap();
    assert_eq!(
        db.reference_holder(300).unwrap(),
        ReferenceHolder::Visits { patient_id: b }
    );
    let mut input = PatientInput::new("D", "Test");
    input.reference_number = Some(300);
    assert!(matches!(
        db.create_patient(&input).unwrap_err(),
        DbError::Constraint(_)
    ));

    assert_eq!(db.patient_count().unwrap(), 2);
    assert_reference_ownership(&db);
}

#[test]
fn test_visit_follows_reference_to_other_patient() {
    let db = Database::open_in_memory().unwrap();
    let a = patient(&db, "A", Some(100));
    let b = patient(&db, "B", Some(200));
    let visit_a = db
        .add_visit(a, &VisitInput::new("2024-01-10", "09:00"))
        .unwrap();
    db.add_visit(b, &VisitInput::new("2024-01-12", "09:00")).unwrap();

    let mut edit = VisitInput::new("2024-01-10", "09:00");
    edit.reference_number = Some(200);
    assert!(db.update_visit(visit_a.visit_id, &edit).unwrap());

    let moved = db.get_visit(visit_a.visit_id).unwrap().unwrap();
    assert_eq!(moved.visit.patient_id, b);
    assert_eq!(moved.visit.reference_number, 200);
    assert!(db.get_patient_visits(a).unwrap().is_empty());
    assert_reference_ownership(&db);
}

#[test]
fn test_renumbering_patient_carries_visits() {
    let db = Database::open_in_memory().unwrap();
    let a = patient(&db, "A", Some(100));
    db.add_visit(a, &VisitInput::new("2024-01-10", "09:00")).unwrap();
    db.add_visit(a, &VisitInput::new("2024-01-11", "09:00")).unwrap();

    let mut edit = PatientInput::new("A", "Test");
    edit.reference_number = Some(150);
    assert!(db.update_patient(a, &edit).unwrap());

    let visits = db.get_patient_visits(a).unwrap();
    assert!(visits.iter().all(|v| v.reference_number == 150));
    assert!(db.is_reference_available(100).unwrap());
    assert_reference_ownership(&db);
}

#[test]
fn test_merge_and_cascade() {
    let db = Database::open_in_memory().unwrap();
    let a = patient(&db, "A", Some(100));
    let b = patient(&db, "B", Some(200));
    let c = patient(&db, "C", Some(300));
    for date in ["2024-01-10", "2024-01-11"] {
        db.add_visit(a, &VisitInput::new(date, "09:00")).unwrap();
    }
    db.add_visit(c, &VisitInput::new("2024-01-12", "09:00")).unwrap();

    db.merge_patients(a, b).unwrap();
    assert!(db.get_patient(a).unwrap().is_none());
    assert_eq!(db.get_patient_visits(b).unwrap().len(), 2);
    assert_reference_ownership(&db);

    assert!(db.delete_patient(c).unwrap());
    assert!(db.get_patient_visits(c).unwrap().is_empty());
    assert!(!db.delete_patient(c).unwrap());
    assert_eq!(db.visit_count().unwrap(), 2);
}

#[test]
fn test_many_visits_share_one_reference() {
    let db = Database::open_in_memory().unwrap();
    let a = patient(&db, "A", None);
    for day in 10..20 {
        db.add_visit(a, &VisitInput::new(format!("2024-01-{}", day), "09:00"))
            .unwrap();
    }
    let visits = db.get_patient_visits(a).unwrap();
    assert_eq!(visits.len(), 10);
    assert!(visits.iter().all(|v| v.reference_number == 1));
    assert_eq!(db.get_visit_by_reference(1).unwrap().unwrap().visit.visit_date, "2024-01-19");
}

#[test]
fn test_number_only_visits_carry_stays_with_their_patient() {
    let db = Database::open_in_memory().unwrap();
    let a = patient(&db, "A", Some(100));
    let b = patient(&db, "B", Some(200));

    // B's visit moves to a number no patient holds
    let visit_b = db.add_visit(b, &VisitInput::new("2024-01-10", "09:00")).unwrap();
    let mut input = VisitInput::new("2024-01-10", "09:00");
    input.reference_number = Some(77);
    assert!(db.update_visit(visit_b.visit_id, &input).unwrap());
    assert_eq!(
        db.reference_holder(77).unwrap(),
        ReferenceHolder::Visits { patient_id: b }
    );
    assert!(!db.is_reference_available(77).unwrap());

    let mut input = VisitInput::new("2024-01-11", "09:00");
    input.reference_number = Some(77);
    let err = db.add_visit(a, &input).unwrap_err();
    assert!(matches!(err, DbError::Constraint(_)), "got {:?}", err);

    // One of A's visits renumbered to 77 goes to B
    let visit_a = db.add_visit(a, &VisitInput::new("2024-01-12", "09:00")).unwrap();
    let mut input = VisitInput::new("2024-01-12", "09:00");
    input.reference_number = Some(77);
    assert!(db.update_visit(visit_a.visit_id, &input).unwrap());
    assert_eq!(db.get_visit(visit_a.visit_id).unwrap().unwrap().visit.patient_id, b);
    let latest = db.get_visit_by_reference(77).unwrap().unwrap();
    assert_eq!(latest.visit.visit_id, visit_a.visit_id);
    assert_eq!(latest.last_name, "B");

    assert_reference_ownership(&db);
}

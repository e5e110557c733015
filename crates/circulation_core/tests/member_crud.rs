use chrono::NaiveDate;
use circulation_core::db::open_db_in_memory;
use circulation_core::repo::member_repo::MemberListQuery;
use circulation_core::{
    Member, MemberService, MemberStatus, RepoError, ServiceError, ValidationError,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn member(code: &str, name: &str, email: &str) -> Member {
    Member::new(code, name, email, date(2024, 1, 10))
}

#[test]
fn register_forces_empty_counter_and_reads_back() {
    let conn = open_db_in_memory().unwrap();
    let members = MemberService::new(&conn);

    let mut input = member("M-001", "Ada Lovelace", "ada@example.org");
    input.active_borrow_count = 3;
    let stored = members.register(&input).unwrap();

    assert_eq!(stored.active_borrow_count, 0);
    assert_eq!(stored.expiry_date, date(2025, 1, 10));
    assert_eq!(members.get(stored.id).unwrap(), stored);
    assert_eq!(
        members.find_by_code("M-001").unwrap().map(|m| m.id),
        Some(stored.id)
    );
    assert!(members.find_by_code("M-404").unwrap().is_none());
}

#[test]
fn invalid_email_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let members = MemberService::new(&conn);
    let err = members
        .register(&member("M-001", "Ada Lovelace", "ada.example.org"))
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::InvalidEmail(_))
    ));
}

#[test]
fn duplicate_email_is_a_constraint_error() {
    let conn = open_db_in_memory().unwrap();
    let members = MemberService::new(&conn);
    members
        .register(&member("M-001", "Ada Lovelace", "ada@example.org"))
        .unwrap();
    let err = members
        .register(&member("M-002", "Ada Byron", "ada@example.org"))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Repo(RepoError::Constraint(_))));
}

#[test]
fn update_changes_profile_but_not_counter() {
    let conn = open_db_in_memory().unwrap();
    let members = MemberService::new(&conn);
    let mut stored = members
        .register(&member("M-001", "Ada Lovelace", "ada@example.org"))
        .unwrap();

    stored.phone = Some("+44 20 0000 0000".to_string());
    stored.status = MemberStatus::Suspended;
    stored.active_borrow_count = 2;
    let updated = members.update(&stored).unwrap();

    assert_eq!(updated.phone.as_deref(), Some("+44 20 0000 0000"));
    assert_eq!(updated.status, MemberStatus::Suspended);
    assert_eq!(updated.active_borrow_count, 0);
}

#[test]
fn list_filters_by_status_and_text() {
    let conn = open_db_in_memory().unwrap();
    let members = MemberService::new(&conn);
    members
        .register(&member("M-001", "Ada Lovelace", "ada@example.org"))
        .unwrap();
    let mut grace = member("M-002", "Grace Hopper", "grace@example.org");
    grace.status = MemberStatus::Expired;
    members.register(&grace).unwrap();
    members
        .register(&member("M-003", "Alan Turing", "alan@example.org"))
        .unwrap();

    let active = members
        .list(&MemberListQuery {
            status: Some(MemberStatus::Active),
            ..MemberListQuery::default()
        })
        .unwrap();
    let codes: Vec<_> = active.iter().map(|m| m.code.as_str()).collect();
    assert_eq!(codes, vec!["M-001", "M-003"]);

    let hopper = members
        .list(&MemberListQuery {
            text: Some("hopper".to_string()),
            ..MemberListQuery::default()
        })
        .unwrap();
    assert_eq!(hopper.len(), 1);
    assert_eq!(hopper[0].code, "M-002");
}

#[test]
fn delete_member_without_loans() {
    let conn = open_db_in_memory().unwrap();
    let members = MemberService::new(&conn);
    let stored = members
        .register(&member("M-001", "Ada Lovelace", "ada@example.org"))
        .unwrap();

    members.delete(stored.id).unwrap();
    assert!(matches!(
        members.get(stored.id).unwrap_err(),
        ServiceError::NotFound { .. }
    ));
}

use chrono::{Days, NaiveDate};
use circulation_core::db::open_db_in_memory;
use circulation_core::{
    CatalogService, Copy, CopyId, FixedClock, LendingPolicy, LoanRecord, LoanService, LoanStatus,
    Member, MemberId, MemberService, OverdueFineEngine, Title,
};
use rusqlite::Connection;
use rust_decimal_macros::dec;

fn day(offset: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .checked_add_days(Days::new(offset))
        .unwrap()
}

fn seed(conn: &Connection, copies: usize) -> (MemberId, Vec<CopyId>) {
    let member = Member::new("M-001", "Ada Lovelace", "ada@example.org", day(0));
    let member = MemberService::new(conn).register(&member).unwrap();
    let catalog = CatalogService::new(conn);
    let title = catalog
        .create_title(&Title::new("ISBN-1", "Dune", "Frank Herbert"))
        .unwrap();
    let copy_ids = (1..=copies)
        .map(|n| {
            catalog
                .add_copy(&Copy::new(title.id, format!("C{n}")))
                .unwrap()
                .id
        })
        .collect();
    (member.id, copy_ids)
}

fn reload(conn: &Connection, record: &LoanRecord) -> LoanRecord {
    LoanService::new(conn, LendingPolicy::default())
        .get_loan(record.loan.id)
        .unwrap()
}

#[test]
fn sweep_is_idempotent_on_the_same_day() {
    let conn = open_db_in_memory().unwrap();
    let clock = FixedClock::new(day(0));
    let (member, copies) = seed(&conn, 1);
    let loans = LoanService::with_clock(&conn, LendingPolicy::default(), &clock);
    let record = loans.create_loan(member, &copies, None).unwrap();
    let engine = OverdueFineEngine::with_clock(&conn, LendingPolicy::default(), &clock);

    let first = engine.run_sweep(day(20)).unwrap();
    let after_first = reload(&conn, &record);
    let second = engine.run_sweep(day(20)).unwrap();
    let after_second = reload(&conn, &record);

    assert_eq!(first.scanned, 1);
    assert_eq!(first.flagged_overdue, 1);
    assert_eq!(first.lines_repriced, 1);
    assert!(first.is_clean());
    assert_eq!(second.flagged_overdue, 0);
    assert_eq!(second.lines_repriced, 1);

    assert_eq!(after_first.loan.status, LoanStatus::Overdue);
    assert_eq!(after_first.lines[0].fine, dec!(30000));
    assert_eq!(after_first, after_second);
    assert_eq!(
        after_second.lines[0].notes.as_deref(),
        Some("overdue 6 days, fine 30000")
    );
}

#[test]
fn sweep_fine_grows_day_by_day() {
    let conn = open_db_in_memory().unwrap();
    let clock = FixedClock::new(day(0));
    let (member, copies) = seed(&conn, 1);
    let record = LoanService::with_clock(&conn, LendingPolicy::default(), &clock)
        .create_loan(member, &copies, None)
        .unwrap();
    let engine = OverdueFineEngine::with_clock(&conn, LendingPolicy::default(), &clock);

    clock.set(day(20));
    engine.run_sweep_today().unwrap();
    assert_eq!(reload(&conn, &record).lines[0].fine, dec!(30000));

    clock.set(day(21));
    let report = engine.run_sweep_today().unwrap();
    assert_eq!(report.evaluated_on, day(21));
    let line = reload(&conn, &record).lines.remove(0);
    assert_eq!(line.fine, dec!(35000));
    assert_eq!(line.notes.as_deref(), Some("overdue 7 days, fine 35000"));
}

#[test]
fn loans_not_yet_past_due_are_left_alone() {
    let conn = open_db_in_memory().unwrap();
    let clock = FixedClock::new(day(0));
    let (member, copies) = seed(&conn, 1);
    let record = LoanService::with_clock(&conn, LendingPolicy::default(), &clock)
        .create_loan(member, &copies, None)
        .unwrap();

    let report = OverdueFineEngine::with_clock(&conn, LendingPolicy::default(), &clock)
        .run_sweep(day(14))
        .unwrap();

    assert_eq!(report.scanned, 0);
    let after = reload(&conn, &record);
    assert_eq!(after.loan.status, LoanStatus::Active);
    assert!(after.lines[0].fine.is_zero());
}

#[test]
fn closed_lines_keep_their_fine() {
    let conn = open_db_in_memory().unwrap();
    let clock = FixedClock::new(day(0));
    let (member, copies) = seed(&conn, 2);
    let loans = LoanService::with_clock(&conn, LendingPolicy::default(), &clock);
    let record = loans.create_loan(member, &copies, None).unwrap();
    clock.set(day(16));
    loans.return_line(record.lines[0].id).unwrap();

    let report = OverdueFineEngine::with_clock(&conn, LendingPolicy::default(), &clock)
        .run_sweep(day(20))
        .unwrap();

    assert_eq!(report.lines_repriced, 1);
    let after = reload(&conn, &record);
    assert_eq!(after.lines[0].fine, dec!(10000));
    assert_eq!(after.lines[1].fine, dec!(30000));
    assert_eq!(after.loan.status, LoanStatus::Overdue);
}

#[test]
fn returned_loans_are_not_scanned() {
    let conn = open_db_in_memory().unwrap();
    let clock = FixedClock::new(day(0));
    let (member, copies) = seed(&conn, 1);
    let loans = LoanService::with_clock(&conn, LendingPolicy::default(), &clock);
    let record = loans.create_loan(member, &copies, None).unwrap();
    loans.return_all_lines(record.loan.id).unwrap();

    let report = OverdueFineEngine::with_clock(&conn, LendingPolicy::default(), &clock)
        .run_sweep(day(30))
        .unwrap();
    assert_eq!(report.scanned, 0);
}

#[test]
fn policy_rate_is_exact_decimal() {
    let conn = open_db_in_memory().unwrap();
    let clock = FixedClock::new(day(0));
    let (member, copies) = seed(&conn, 1);
    let record = LoanService::with_clock(&conn, LendingPolicy::default(), &clock)
        .create_loan(member, &copies, None)
        .unwrap();
    let policy = LendingPolicy {
        late_fee_per_day: dec!(2500.50),
        ..LendingPolicy::default()
    };

    OverdueFineEngine::with_clock(&conn, policy, &clock)
        .run_sweep(day(17))
        .unwrap();
    assert_eq!(reload(&conn, &record).lines[0].fine, dec!(7501.50));
}

#[test]
fn one_broken_loan_does_not_stop_the_run() {
    let conn = open_db_in_memory().unwrap();
    let clock = FixedClock::new(day(0));
    let (member, copies) = seed(&conn, 2);
    let loans = LoanService::with_clock(&conn, LendingPolicy::default(), &clock);
    let broken = loans.create_loan(member, &copies[..1], None).unwrap();
    let healthy = loans.create_loan(member, &copies[1..], None).unwrap();
    conn.execute(
        "UPDATE line_items SET fine = 'not-a-number' WHERE line_uuid = ?1;",
        [broken.lines[0].id.to_string()],
    )
    .unwrap();

    let report = OverdueFineEngine::with_clock(&conn, LendingPolicy::default(), &clock)
        .run_sweep(day(20))
        .unwrap();

    assert_eq!(report.scanned, 2);
    assert_eq!(report.flagged_overdue, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].loan_id, broken.loan.id);
    assert_eq!(report.failures[0].error_code, "repo");
    assert!(!report.is_clean());

    let after = reload(&conn, &healthy);
    assert_eq!(after.loan.status, LoanStatus::Overdue);
    assert_eq!(after.lines[0].fine, dec!(30000));
}

#[test]
fn cheaper_policy_never_lowers_an_unsettled_fine() {
    let conn = open_db_in_memory().unwrap();
    let clock = FixedClock::new(day(0));
    let (member, copies) = seed(&conn, 1);
    let loans = LoanService::with_clock(&conn, LendingPolicy::default(), &clock);
    let record = loans.create_loan(member, &copies, None).unwrap();

    OverdueFineEngine::with_clock(&conn, LendingPolicy::default(), &clock)
        .run_sweep(day(20))
        .unwrap();
    let cheap = LendingPolicy {
        late_fee_per_day: dec!(1000),
        ..LendingPolicy::default()
    };
    let cheap_engine = OverdueFineEngine::with_clock(&conn, cheap, &clock);
    cheap_engine.run_sweep(day(21)).unwrap();

    let line = reload(&conn, &record).lines.remove(0);
    assert_eq!(line.fine, dec!(30000));
    assert_eq!(line.notes.as_deref(), Some("overdue 7 days, fine 30000"));

    loans.settle_fines(record.loan.id).unwrap();
    cheap_engine.run_sweep(day(22)).unwrap();
    let line = reload(&conn, &record).lines.remove(0);
    assert_eq!(line.fine, dec!(8000));
}

#[test]
fn return_after_sweep_adds_late_fine_on_top() {
    let conn = open_db_in_memory().unwrap();
    let clock = FixedClock::new(day(0));
    let (member, copies) = seed(&conn, 1);
    let loans = LoanService::with_clock(&conn, LendingPolicy::default(), &clock);
    let record = loans.create_loan(member, &copies, None).unwrap();

    clock.set(day(20));
    OverdueFineEngine::with_clock(&conn, LendingPolicy::default(), &clock)
        .run_sweep_today()
        .unwrap();
    let returned = loans.return_line(record.lines[0].id).unwrap();

    let line = &returned.lines[0];
    assert_eq!(line.fine, dec!(60000));
    assert_eq!(
        line.notes.as_deref(),
        Some("overdue 6 days, fine 30000 | returned 6 days late, fine 30000")
    );
    assert_eq!(returned.loan.status, LoanStatus::Returned);
}

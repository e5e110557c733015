use circulation_core::db::open_db;
use circulation_core::{
    CatalogService, Clock, Copy, CopyId, CopyStatus, LendingPolicy, LoanService, Member,
    MemberId, MemberService, SystemClock, Title,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;

fn seed(path: &Path, members: usize, copies: usize) -> (Vec<MemberId>, Vec<CopyId>) {
    let conn = open_db(path).unwrap();
    let today = SystemClock.today();
    let member_service = MemberService::new(&conn);
    let member_ids = (1..=members)
        .map(|n| {
            let member = Member::new(
                format!("M-{n:03}"),
                format!("Member {n}"),
                format!("member{n}@example.org"),
                today,
            );
            member_service.register(&member).unwrap().id
        })
        .collect();

    let catalog = CatalogService::new(&conn);
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
    (member_ids, copy_ids)
}

/// Runs each request on its own connection, released together.
fn race(path: &Path, requests: Vec<(MemberId, CopyId)>) -> Vec<Result<(), &'static str>> {
    let barrier = Arc::new(Barrier::new(requests.len()));
    let handles: Vec<_> = requests
        .into_iter()
        .map(|(member, copy)| {
            let path = PathBuf::from(path);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let loans = LoanService::new(&conn, LendingPolicy::default());
                barrier.wait();
                loans
                    .create_loan(member, &[copy], None)
                    .map(|_| ())
                    .map_err(|err| err.code())
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect()
}

#[test]
fn two_borrowers_racing_for_one_copy_get_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.db");
    let (members, copies) = seed(&path, 2, 1);

    let results = race(&path, vec![(members[0], copies[0]), (members[1], copies[0])]);

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results.contains(&Err("copy_unavailable")));

    let conn = open_db(&path).unwrap();
    let copy = CatalogService::new(&conn).get_copy(copies[0]).unwrap();
    assert_eq!(copy.status, CopyStatus::Borrowed);
    let loans = LoanService::new(&conn, LendingPolicy::default());
    assert!(loans.audit_counters().unwrap().is_empty());
    let total_open: u32 = members
        .iter()
        .map(|id| loans.count_open_lines(*id).unwrap())
        .sum();
    assert_eq!(total_open, 1);
}

#[test]
fn racing_for_last_capacity_unit_admits_one_loan() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.db");
    let (members, copies) = seed(&path, 1, 4);
    let member = members[0];
    {
        let conn = open_db(&path).unwrap();
        LoanService::new(&conn, LendingPolicy::default())
            .create_loan(member, &copies[..2], None)
            .unwrap();
    }

    let results = race(&path, vec![(member, copies[2]), (member, copies[3])]);

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.contains(&Err("capacity_exceeded")));

    let conn = open_db(&path).unwrap();
    let stored = MemberService::new(&conn).get(member).unwrap();
    assert_eq!(stored.active_borrow_count, 3);
    let catalog = CatalogService::new(&conn);
    let borrowed = copies[2..]
        .iter()
        .filter(|id| catalog.get_copy(**id).unwrap().status == CopyStatus::Borrowed)
        .count();
    assert_eq!(borrowed, 1);
}

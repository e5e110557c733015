//! Membership guard: per-member capacity accounting.
//!
//! # Responsibility
//! - Reserve and release units of borrowing capacity.
//! - Recount, audit and repair the cached `active_borrow_count`.
//!
//! # Invariants
//! - `0 <= active_borrow_count <= MAX_ACTIVE_LOANS` at every commit.
//! - Reservation is evaluated and applied in one statement.
//!
//! Membership validity (status, expiry) is the caller's concern.

use crate::model::member::MemberId;
use crate::model::policy::MAX_ACTIVE_LOANS;
use crate::repo::member_repo::{BorrowCountAudit, CounterUpdate, MemberRepository};
use crate::repo::EntityKind;
use crate::service::error::{ServiceError, ServiceResult};
use log::{debug, warn};

pub struct MembershipGuard<R: MemberRepository> {
    repo: R,
}

impl<R: MemberRepository> MembershipGuard<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Reserves `count` units for the member and returns the new counter.
    ///
    /// # Errors
    /// - `CapacityExceeded` when the counter would pass the cap; the counter
    ///   is left unchanged.
    /// - `NotFound` when the member does not exist.
    pub fn reserve_capacity(&self, member_id: MemberId, count: u32) -> ServiceResult<u32> {
        match self
            .repo
            .try_increment_borrow_count(member_id, count, MAX_ACTIVE_LOANS)?
        {
            CounterUpdate::Applied(current) => {
                debug!(
                    "event=capacity_reserve module=guard status=ok member={member_id} count={count} active={current}"
                );
                Ok(current)
            }
            CounterUpdate::Rejected(active) => Err(ServiceError::CapacityExceeded {
                member_id,
                active,
                requested: count,
                cap: MAX_ACTIVE_LOANS,
            }),
        }
    }

    /// Releases `count` units, clamped at zero. Returns the new counter.
    pub fn release_capacity(&self, member_id: MemberId, count: u32) -> ServiceResult<u32> {
        let current = self.repo.decrement_borrow_count(member_id, count)?;
        debug!(
            "event=capacity_release module=guard status=ok member={member_id} count={count} active={current}"
        );
        Ok(current)
    }

    /// Number of open line items persisted for the member.
    pub fn recount(&self, member_id: MemberId) -> ServiceResult<u32> {
        if self.repo.get_member(member_id)?.is_none() {
            return Err(ServiceError::not_found(EntityKind::Member, member_id));
        }
        Ok(self.repo.count_open_lines(member_id)?)
    }

    /// Members whose stored counter differs from the recount.
    pub fn audit_counters(&self) -> ServiceResult<Vec<BorrowCountAudit>> {
        let mismatches: Vec<_> = self
            .repo
            .audit_borrow_counts()?
            .into_iter()
            .filter(|audit| !audit.is_consistent())
            .collect();
        for audit in &mismatches {
            warn!(
                "event=counter_mismatch module=guard status=warn member={} stored={} actual={}",
                audit.member_id, audit.stored, audit.actual
            );
        }
        Ok(mismatches)
    }

    /// Rewrites mismatched counters to the recount. Returns what it fixed.
    ///
    /// A recount above the cap is reported but left untouched; the schema
    /// check would reject it.
    pub fn repair_counters(&self) -> ServiceResult<Vec<BorrowCountAudit>> {
        let mismatches = self.audit_counters()?;
        let mut repaired = Vec::with_capacity(mismatches.len());
        for audit in mismatches {
            if audit.actual > MAX_ACTIVE_LOANS {
                warn!(
                    "event=counter_repair module=guard status=skipped member={} actual={}",
                    audit.member_id, audit.actual
                );
                continue;
            }
            self.repo.set_borrow_count(audit.member_id, audit.actual)?;
            repaired.push(audit);
        }
        Ok(repaired)
    }
}

#[cfg(test)]
mod tests {
    use super::MembershipGuard;
    use crate::db::open_db_in_memory;
    use crate::model::member::Member;
    use crate::repo::member_repo::{MemberRepository, SqliteMemberRepository};
    use crate::service::error::ServiceError;
    use chrono::NaiveDate;

    fn seed_member(conn: &rusqlite::Connection) -> Member {
        let member = Member::new(
            "M-001",
            "Ada Lovelace",
            "ada@example.org",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        SqliteMemberRepository::new(conn)
            .create_member(&member)
            .unwrap();
        member
    }

    #[test]
    fn reserve_respects_cap_and_release_clamps() {
        let conn = open_db_in_memory().unwrap();
        let member = seed_member(&conn);
        let guard = MembershipGuard::new(SqliteMemberRepository::new(&conn));

        assert_eq!(guard.reserve_capacity(member.id, 2).unwrap(), 2);
        let err = guard.reserve_capacity(member.id, 2).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::CapacityExceeded {
                active: 2,
                requested: 2,
                cap: 3,
                ..
            }
        ));
        assert_eq!(guard.reserve_capacity(member.id, 1).unwrap(), 3);

        assert_eq!(guard.release_capacity(member.id, 2).unwrap(), 1);
        assert_eq!(guard.release_capacity(member.id, 5).unwrap(), 0);
    }

    #[test]
    fn repair_resets_drifted_counter() {
        let conn = open_db_in_memory().unwrap();
        let member = seed_member(&conn);
        let guard = MembershipGuard::new(SqliteMemberRepository::new(&conn));
        guard.reserve_capacity(member.id, 2).unwrap();

        let mismatches = guard.audit_counters().unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].stored, 2);
        assert_eq!(mismatches[0].actual, 0);

        let repaired = guard.repair_counters().unwrap();
        assert_eq!(repaired.len(), 1);
        assert!(guard.audit_counters().unwrap().is_empty());
        assert_eq!(guard.recount(member.id).unwrap(), 0);
    }
}

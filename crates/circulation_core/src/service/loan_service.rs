//! Loan transaction manager.
//!
//! # Responsibility
//! - Create loans across several copies as one all-or-nothing step.
//! - Close line items by return or by damaged/lost adjudication.
//! - Settle fines and delete fully settled transactions.
//!
//! # Invariants
//! - A transaction is `Returned` iff all of its line items are closed; the
//!   status flips on the closing of the last line.
//! - Every line closed here releases exactly one unit of member capacity.
//! - Return-time late fines are added to the stored fine; they never
//!   overwrite it.
//! - Every mutation runs in one IMMEDIATE transaction; failures leave no
//!   partial state.

use crate::model::catalog::{AdjudicationOutcome, CopyId};
use crate::model::clock::{Clock, SystemClock};
use crate::model::loan::{
    LineItem, LineItemId, LoanId, LoanRecord, LoanStatus, LoanTransaction, SETTLED_NOTE,
};
use crate::model::member::MemberId;
use crate::model::policy::{days_late, default_due_date, LendingPolicy};
use crate::repo::catalog_repo::SqliteCatalogRepository;
use crate::repo::loan_repo::{LineScope, LoanListQuery, LoanRepository, SqliteLoanRepository};
use crate::repo::member_repo::{BorrowCountAudit, MemberRepository, SqliteMemberRepository};
use crate::repo::EntityKind;
use crate::service::error::{ServiceError, ServiceResult};
use crate::service::inventory_ledger::InventoryLedger;
use crate::service::membership_guard::MembershipGuard;
use crate::service::run_immediate;
use chrono::NaiveDate;
use log::info;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::collections::HashSet;

/// Loan use-case service bound to one connection.
pub struct LoanService<'conn, C: Clock = SystemClock> {
    conn: &'conn Connection,
    policy: LendingPolicy,
    clock: C,
}

impl<'conn> LoanService<'conn, SystemClock> {
    pub fn new(conn: &'conn Connection, policy: LendingPolicy) -> Self {
        Self::with_clock(conn, policy, SystemClock)
    }
}

impl<'conn, C: Clock> LoanService<'conn, C> {
    pub fn with_clock(conn: &'conn Connection, policy: LendingPolicy, clock: C) -> Self {
        Self {
            conn,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &LendingPolicy {
        &self.policy
    }

    /// Opens a loan for `member_id` covering every copy in `copy_ids`.
    ///
    /// Borrow date is today; due date is `due_date` or today plus the
    /// default loan period.
    ///
    /// # Errors
    /// - `InvalidState` for an empty or duplicated copy list, a due date in
    ///   the past, or a member who is not active or has expired.
    /// - `NotFound` for an unknown member or copy.
    /// - `CapacityExceeded` when the copies do not fit the member's cap.
    /// - `CopyUnavailable` when any copy is not on the shelf.
    pub fn create_loan(
        &self,
        member_id: MemberId,
        copy_ids: &[CopyId],
        due_date: Option<NaiveDate>,
    ) -> ServiceResult<LoanRecord> {
        let today = self.clock.today();
        run_immediate(self.conn, "loan_create", |conn| {
            if copy_ids.is_empty() {
                return Err(ServiceError::InvalidState(
                    "a loan needs at least one copy".to_string(),
                ));
            }
            let mut seen = HashSet::with_capacity(copy_ids.len());
            if let Some(duplicate) = copy_ids.iter().find(|id| !seen.insert(**id)) {
                return Err(ServiceError::InvalidState(format!(
                    "copy {duplicate} requested twice"
                )));
            }
            let due_date = match due_date {
                Some(date) if date < today => {
                    return Err(ServiceError::InvalidState(format!(
                        "due date {date} is before borrow date {today}"
                    )));
                }
                Some(date) => date,
                None => default_due_date(today),
            };

            let member = SqliteMemberRepository::new(conn)
                .get_member(member_id)?
                .ok_or_else(|| ServiceError::not_found(EntityKind::Member, member_id))?;
            if !member.can_borrow_on(today) {
                return Err(ServiceError::InvalidState(format!(
                    "member {member_id} cannot borrow: status {}, expires {}",
                    member.status.as_str(),
                    member.expiry_date
                )));
            }

            let requested = u32::try_from(copy_ids.len()).unwrap_or(u32::MAX);
            MembershipGuard::new(SqliteMemberRepository::new(conn))
                .reserve_capacity(member_id, requested)?;

            let ledger = InventoryLedger::new(SqliteCatalogRepository::new(conn));
            for &copy_id in copy_ids {
                ledger.mark_borrowed(copy_id).map_err(|err| match err {
                    ServiceError::InvalidState(_) => ServiceError::CopyUnavailable(copy_id),
                    other => other,
                })?;
            }

            let loans = SqliteLoanRepository::new(conn);
            let loan = LoanTransaction::new(member_id, today, due_date);
            loans.create_loan(&loan)?;
            let mut lines = Vec::with_capacity(copy_ids.len());
            for &copy_id in copy_ids {
                let line = LineItem::new(loan.id, copy_id);
                loans.create_line(&line)?;
                lines.push(line);
            }

            info!(
                "event=loan_create module=loan status=ok loan={} member={} copies={} due={}",
                loan.id,
                member_id,
                lines.len(),
                loan.due_date
            );
            Ok(LoanRecord { loan, lines })
        })
    }

    /// Returns one copy. Late days are charged on top of the stored fine.
    ///
    /// # Errors
    /// - `AlreadyReturned` when the line is already closed.
    pub fn return_line(&self, line_id: LineItemId) -> ServiceResult<LoanRecord> {
        let today = self.clock.today();
        run_immediate(self.conn, "loan_return_line", |conn| {
            let loan_id = self.return_line_in(conn, line_id, today)?;
            self.close_if_complete(conn, loan_id, today)
        })
    }

    /// Returns every open copy of a transaction and stamps it returned.
    pub fn return_all_lines(&self, loan_id: LoanId) -> ServiceResult<LoanRecord> {
        let today = self.clock.today();
        run_immediate(self.conn, "loan_return_all", |conn| {
            let loans = SqliteLoanRepository::new(conn);
            let record = load_record(&loans, loan_id)?;
            let open: Vec<LineItemId> = record.open_lines().map(|line| line.id).collect();
            let mut loan = record.loan;
            for line_id in &open {
                self.return_line_in(conn, *line_id, today)?;
            }

            if loan.status != LoanStatus::Returned {
                loan.status = LoanStatus::Returned;
                loan.return_date = Some(today);
                loans.update_loan(&loan)?;
            }
            info!(
                "event=loan_return_all module=loan status=ok loan={loan_id} lines_returned={}",
                open.len()
            );
            load_record(&loans, loan_id)
        })
    }

    /// Closes a line whose copy will not come back to the shelf.
    ///
    /// The copy is marked damaged or lost and the fixed fine for the outcome
    /// is added to the line's fine.
    ///
    /// # Errors
    /// - `AlreadyReturned` when the line is already closed.
    pub fn adjudicate_line(
        &self,
        line_id: LineItemId,
        outcome: AdjudicationOutcome,
    ) -> ServiceResult<LoanRecord> {
        let today = self.clock.today();
        run_immediate(self.conn, "loan_adjudicate", |conn| {
            let loans = SqliteLoanRepository::new(conn);
            let mut line = load_open_line(&loans, line_id)?;
            let loan = load_loan(&loans, line.loan_id)?;

            InventoryLedger::new(SqliteCatalogRepository::new(conn))
                .mark_adjudicated(line.copy_id, outcome)?;

            let charge = self.policy.adjudication_fine(outcome);
            line.fine += charge;
            line.append_note(outcome.note());
            line.actual_return_date = Some(today);
            loans.update_line(&line)?;

            MembershipGuard::new(SqliteMemberRepository::new(conn))
                .release_capacity(loan.member_id, 1)?;

            info!(
                "event=loan_adjudicate module=loan status=ok loan={} line={} outcome={} fine={}",
                loan.id,
                line.id,
                outcome.copy_status().as_str(),
                line.fine
            );
            self.close_if_complete(conn, loan.id, today)
        })
    }

    /// Deletes a transaction whose copies are all back and fines settled.
    ///
    /// # Errors
    /// - `HasOpenCopies` while any line is open.
    /// - `UnpaidFine` while the total fine is above zero.
    pub fn delete_transaction(&self, loan_id: LoanId) -> ServiceResult<()> {
        run_immediate(self.conn, "loan_delete", |conn| {
            let loans = SqliteLoanRepository::new(conn);
            let record = load_record(&loans, loan_id)?;
            if !record.all_lines_closed() {
                return Err(ServiceError::HasOpenCopies {
                    entity: EntityKind::Loan,
                    id: loan_id,
                });
            }
            let total = record.total_fine();
            if total > Decimal::ZERO {
                return Err(ServiceError::UnpaidFine {
                    entity: EntityKind::Loan,
                    id: loan_id,
                    total,
                });
            }
            loans.delete_loan(loan_id)?;
            info!("event=loan_delete module=loan status=ok loan={loan_id}");
            Ok(())
        })
    }

    /// Clears every positive line fine and leaves a settlement note.
    pub fn settle_fines(&self, loan_id: LoanId) -> ServiceResult<LoanRecord> {
        run_immediate(self.conn, "loan_settle", |conn| {
            let loans = SqliteLoanRepository::new(conn);
            let mut record = load_record(&loans, loan_id)?;
            let mut settled = Decimal::ZERO;
            for line in record.lines.iter_mut().filter(|l| l.fine > Decimal::ZERO) {
                settled += line.fine;
                line.fine = Decimal::ZERO;
                line.append_note(SETTLED_NOTE);
                loans.update_line(line)?;
            }
            info!("event=loan_settle module=loan status=ok loan={loan_id} amount={settled}");
            Ok(record)
        })
    }

    pub fn get_loan(&self, loan_id: LoanId) -> ServiceResult<LoanRecord> {
        load_record(&SqliteLoanRepository::new(self.conn), loan_id)
    }

    pub fn list_loans(&self, query: &LoanListQuery) -> ServiceResult<Vec<LoanTransaction>> {
        Ok(SqliteLoanRepository::new(self.conn).list_loans(query)?)
    }

    /// Sum of line fines of one transaction.
    pub fn total_fine(&self, loan_id: LoanId) -> ServiceResult<Decimal> {
        Ok(self.get_loan(loan_id)?.total_fine())
    }

    /// Open line items across all loans of a member.
    pub fn count_open_lines(&self, member_id: MemberId) -> ServiceResult<u32> {
        MembershipGuard::new(SqliteMemberRepository::new(self.conn)).recount(member_id)
    }

    /// Members whose cached borrow counter drifted from their open lines.
    pub fn audit_counters(&self) -> ServiceResult<Vec<BorrowCountAudit>> {
        MembershipGuard::new(SqliteMemberRepository::new(self.conn)).audit_counters()
    }

    /// Rewrites drifted borrow counters and returns the fixed entries.
    pub fn repair_counters(&self) -> ServiceResult<Vec<BorrowCountAudit>> {
        run_immediate(self.conn, "counter_repair", |conn| {
            let repaired =
                MembershipGuard::new(SqliteMemberRepository::new(conn)).repair_counters()?;
            info!(
                "event=counter_repair module=loan status=ok repaired={}",
                repaired.len()
            );
            Ok(repaired)
        })
    }

    /// Closes one open line as physically returned on `today`. Returns the
    /// owning loan id.
    fn return_line_in(
        &self,
        conn: &Connection,
        line_id: LineItemId,
        today: NaiveDate,
    ) -> ServiceResult<LoanId> {
        let loans = SqliteLoanRepository::new(conn);
        let mut line = load_open_line(&loans, line_id)?;
        let loan = load_loan(&loans, line.loan_id)?;

        line.actual_return_date = Some(today);
        let late = self.policy.late_fine(loan.due_date, today);
        if late > Decimal::ZERO {
            line.fine += late;
            line.append_note(&format!(
                "returned {} days late, fine {late}",
                days_late(loan.due_date, today)
            ));
        }
        loans.update_line(&line)?;

        InventoryLedger::new(SqliteCatalogRepository::new(conn)).mark_available(line.copy_id)?;
        MembershipGuard::new(SqliteMemberRepository::new(conn))
            .release_capacity(loan.member_id, 1)?;

        info!(
            "event=loan_return_line module=loan status=ok loan={} line={} late_fine={late}",
            loan.id, line.id
        );
        Ok(loan.id)
    }

    /// Stamps the loan returned when its last line has closed.
    fn close_if_complete(
        &self,
        conn: &Connection,
        loan_id: LoanId,
        today: NaiveDate,
    ) -> ServiceResult<LoanRecord> {
        let loans = SqliteLoanRepository::new(conn);
        let mut record = load_record(&loans, loan_id)?;
        if record.all_lines_closed() && record.loan.status != LoanStatus::Returned {
            record.loan.status = LoanStatus::Returned;
            record.loan.return_date = Some(today);
            loans.update_loan(&record.loan)?;
            info!("event=loan_close module=loan status=ok loan={loan_id}");
        }
        Ok(record)
    }
}

fn load_loan(loans: &impl LoanRepository, loan_id: LoanId) -> ServiceResult<LoanTransaction> {
    loans
        .get_loan(loan_id)?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Loan, loan_id))
}

fn load_record(loans: &impl LoanRepository, loan_id: LoanId) -> ServiceResult<LoanRecord> {
    let loan = load_loan(loans, loan_id)?;
    let lines = loans.list_lines(LineScope::Loan(loan_id))?;
    Ok(LoanRecord { loan, lines })
}

fn load_open_line(loans: &impl LoanRepository, line_id: LineItemId) -> ServiceResult<LineItem> {
    let line = loans
        .get_line(line_id)?
        .ok_or_else(|| ServiceError::not_found(EntityKind::LineItem, line_id))?;
    if !line.is_open() {
        return Err(ServiceError::AlreadyReturned(line_id));
    }
    Ok(line)
}

//! Overdue sweep and running late fines.
//!
//! # Responsibility
//! - Flag active loans whose due date has passed as overdue.
//! - Reprice the late fine of every still-open line of a past-due loan.
//!
//! # Invariants
//! - The swept fine is recomputed from the due date and replaces the stored
//!   value unless the stored value is higher: same-day reruns are
//!   idempotent, later days only grow and only settlement lowers a fine.
//! - Only the `overdue ...` note segment is rewritten; other segments stay.
//! - One loan per IMMEDIATE transaction. A failing loan is reported and
//!   skipped, the run continues.

use crate::model::clock::{Clock, SystemClock};
use crate::model::loan::{overdue_note, LoanId, LoanStatus};
use crate::model::policy::{days_late, LendingPolicy};
use crate::repo::loan_repo::{LineScope, LoanRepository, SqliteLoanRepository};
use crate::service::error::ServiceResult;
use crate::service::run_immediate;
use chrono::NaiveDate;
use log::{info, warn};
use rusqlite::Connection;
use serde::Serialize;

/// One loan the sweep could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub loan_id: LoanId,
    pub error_code: &'static str,
    pub message: String,
}

/// Outcome of one sweep run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub evaluated_on: NaiveDate,
    /// Past-due, non-returned loans selected for the run.
    pub scanned: usize,
    /// Loans moved from active to overdue by this run.
    pub flagged_overdue: usize,
    /// Open lines whose fine was recomputed.
    pub lines_repriced: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    fn new(evaluated_on: NaiveDate) -> Self {
        Self {
            evaluated_on,
            scanned: 0,
            flagged_overdue: 0,
            lines_repriced: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct LoanSweep {
    flagged: bool,
    repriced: usize,
}

pub struct OverdueFineEngine<'conn, C: Clock = SystemClock> {
    conn: &'conn Connection,
    policy: LendingPolicy,
    clock: C,
}

impl<'conn> OverdueFineEngine<'conn, SystemClock> {
    pub fn new(conn: &'conn Connection, policy: LendingPolicy) -> Self {
        Self::with_clock(conn, policy, SystemClock)
    }
}

impl<'conn, C: Clock> OverdueFineEngine<'conn, C> {
    pub fn with_clock(conn: &'conn Connection, policy: LendingPolicy, clock: C) -> Self {
        Self {
            conn,
            policy,
            clock,
        }
    }

    /// Sweeps as of the clock's today.
    pub fn run_sweep_today(&self) -> ServiceResult<SweepReport> {
        self.run_sweep(self.clock.today())
    }

    /// Flags and reprices every loan past due on `evaluated_on`.
    ///
    /// # Errors
    /// Fails only when the candidate listing itself fails. Per-loan failures
    /// are collected in [`SweepReport::failures`].
    pub fn run_sweep(&self, evaluated_on: NaiveDate) -> ServiceResult<SweepReport> {
        let candidates: Vec<LoanId> = SqliteLoanRepository::new(self.conn)
            .list_past_due(evaluated_on)?
            .into_iter()
            .map(|loan| loan.id)
            .collect();

        let mut report = SweepReport::new(evaluated_on);
        report.scanned = candidates.len();
        for loan_id in candidates {
            match run_immediate(self.conn, "sweep_loan", |conn| {
                self.sweep_loan(conn, loan_id, evaluated_on)
            }) {
                Ok(outcome) => {
                    report.flagged_overdue += usize::from(outcome.flagged);
                    report.lines_repriced += outcome.repriced;
                }
                Err(err) => {
                    warn!("event=sweep_skip module=fine status=error loan={loan_id}");
                    report.failures.push(SweepFailure {
                        loan_id,
                        error_code: err.code(),
                        message: err.to_string(),
                    });
                }
            }
        }

        info!(
            "event=sweep_done module=fine status=ok evaluated_on={} scanned={} flagged={} repriced={} failures={}",
            report.evaluated_on,
            report.scanned,
            report.flagged_overdue,
            report.lines_repriced,
            report.failures.len()
        );
        Ok(report)
    }

    fn sweep_loan(
        &self,
        conn: &Connection,
        loan_id: LoanId,
        evaluated_on: NaiveDate,
    ) -> ServiceResult<LoanSweep> {
        let loans = SqliteLoanRepository::new(conn);
        // Re-read under the write lock; a return may have landed since listing.
        let Some(mut loan) = loans.get_loan(loan_id)? else {
            return Ok(LoanSweep {
                flagged: false,
                repriced: 0,
            });
        };
        if !loan.is_past_due(evaluated_on) {
            return Ok(LoanSweep {
                flagged: false,
                repriced: 0,
            });
        }

        let flagged = loan.status == LoanStatus::Active;
        if flagged {
            loan.status = LoanStatus::Overdue;
            loans.update_loan(&loan)?;
        }

        let days = days_late(loan.due_date, evaluated_on);
        let fine = self.policy.late_fine(loan.due_date, evaluated_on);
        let mut repriced = 0;
        for mut line in loans
            .list_lines(LineScope::Loan(loan_id))?
            .into_iter()
            .filter(|line| line.is_open())
        {
            // A cheaper policy never lowers an unsettled fine.
            line.fine = fine.max(line.fine);
            line.refresh_overdue_note(&overdue_note(days, line.fine));
            loans.update_line(&line)?;
            repriced += 1;
        }

        Ok(LoanSweep { flagged, repriced })
    }
}

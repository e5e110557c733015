//! Loan transaction and line item model.
//!
//! # Responsibility
//! - Define the borrowing event (`LoanTransaction`) and its per-copy records
//!   (`LineItem`).
//! - Provide note helpers used for fine audit trails.
//!
//! # Invariants
//! - Status is `Returned` iff every line item has `actual_return_date`.
//! - Status is `Overdue` iff not returned and the due date has passed.
//! - A line item with `actual_return_date` is closed regardless of the
//!   transaction status.
//! - Line fines only grow, except on explicit settlement.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::catalog::CopyId;
use super::member::MemberId;

pub type LoanId = Uuid;
pub type LineItemId = Uuid;

/// Separator between note segments.
pub const NOTE_SEPARATOR: &str = " | ";

/// Prefix of the note segment owned by the overdue sweep.
pub const OVERDUE_NOTE_PREFIX: &str = "overdue ";

/// Note segment appended when fines are settled.
pub const SETTLED_NOTE: &str = "fine settled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Overdue,
    Returned,
}

impl LoanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Overdue => "overdue",
            Self::Returned => "returned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "overdue" => Some(Self::Overdue),
            "returned" => Some(Self::Returned),
            _ => None,
        }
    }
}

/// Borrowing event covering one or more copies for one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTransaction {
    pub id: LoanId,
    pub member_id: MemberId,
    pub borrow_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: LoanStatus,
    pub return_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl LoanTransaction {
    pub fn new(member_id: MemberId, borrow_date: NaiveDate, due_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            member_id,
            borrow_date,
            due_date,
            status: LoanStatus::Active,
            return_date: None,
            notes: None,
        }
    }

    /// Returns whether the loan is past due on `on` and still open.
    pub fn is_past_due(&self, on: NaiveDate) -> bool {
        self.status != LoanStatus::Returned && self.due_date < on
    }
}

/// One copy's borrow/return record within a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub loan_id: LoanId,
    pub copy_id: CopyId,
    pub actual_return_date: Option<NaiveDate>,
    pub fine: Decimal,
    pub notes: Option<String>,
}

impl LineItem {
    pub fn new(loan_id: LoanId, copy_id: CopyId) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            copy_id,
            actual_return_date: None,
            fine: Decimal::ZERO,
            notes: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.actual_return_date.is_none()
    }

    /// Appends a note segment, keeping earlier segments.
    pub fn append_note(&mut self, segment: &str) {
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => {
                format!("{existing}{NOTE_SEPARATOR}{segment}")
            }
            _ => segment.to_string(),
        });
    }

    /// Replaces the sweep-owned note segment, keeping all others.
    pub fn refresh_overdue_note(&mut self, segment: &str) {
        let kept = self
            .notes
            .as_deref()
            .map(|notes| {
                notes
                    .split(NOTE_SEPARATOR)
                    .filter(|part| !part.is_empty() && !part.starts_with(OVERDUE_NOTE_PREFIX))
                    .collect::<Vec<_>>()
                    .join(NOTE_SEPARATOR)
            })
            .filter(|notes| !notes.is_empty());
        self.notes = kept;
        self.append_note(segment);
    }
}

/// Loan transaction together with its line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub loan: LoanTransaction,
    pub lines: Vec<LineItem>,
}

impl LoanRecord {
    /// Sum of all line fines.
    pub fn total_fine(&self) -> Decimal {
        self.lines.iter().map(|line| line.fine).sum()
    }

    pub fn open_lines(&self) -> impl Iterator<Item = &LineItem> {
        self.lines.iter().filter(|line| line.is_open())
    }

    pub fn all_lines_closed(&self) -> bool {
        self.lines.iter().all(|line| !line.is_open())
    }
}

/// Sweep note segment for a line that is `days` days overdue.
pub fn overdue_note(days: i64, fine: Decimal) -> String {
    format!("{OVERDUE_NOTE_PREFIX}{days} days, fine {fine}")
}

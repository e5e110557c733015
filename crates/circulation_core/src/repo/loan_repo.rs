//! Loan transaction repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist loan transactions and their line items.
//! - Provide the filtered listings used by the loan manager, the overdue
//!   sweep and the deletion guards.
//!
//! # Invariants
//! - Line items are always listed in insertion order of their loan
//!   (`created_at ASC, line_uuid ASC`).
//! - Fines are stored as exact decimal text and parsed back losslessly.

use super::{
    ensure_schema_ready, parse_decimal, parse_enum, parse_uuid, EntityKind, Page, RepoError,
    RepoResult,
};
use crate::model::catalog::{CopyId, TitleId};
use crate::model::loan::{LineItem, LineItemId, LoanId, LoanStatus, LoanTransaction};
use crate::model::member::MemberId;
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const LOAN_SELECT_SQL: &str = "SELECT
    loan_uuid,
    member_uuid,
    borrow_date,
    due_date,
    status,
    return_date,
    notes
FROM loans";

const LINE_SELECT_SQL: &str = "SELECT
    li.line_uuid AS line_uuid,
    li.loan_uuid AS loan_uuid,
    li.copy_uuid AS copy_uuid,
    li.actual_return_date AS actual_return_date,
    li.fine AS fine,
    li.notes AS notes
FROM line_items li";

/// Query options for listing loan transactions.
#[derive(Debug, Clone, Default)]
pub struct LoanListQuery {
    pub member_id: Option<MemberId>,
    pub status: Option<LoanStatus>,
    /// Inclusive lower bound on `borrow_date`.
    pub borrowed_from: Option<NaiveDate>,
    /// Inclusive upper bound on `borrow_date`.
    pub borrowed_to: Option<NaiveDate>,
    pub page: Page,
}

/// Set of line items selected by their owning entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineScope {
    Loan(LoanId),
    Copy(CopyId),
    Title(TitleId),
    Member(MemberId),
}

/// Repository interface for loan transactions and line items.
pub trait LoanRepository {
    fn create_loan(&self, loan: &LoanTransaction) -> RepoResult<LoanId>;
    /// Updates due date, status, return date and notes.
    fn update_loan(&self, loan: &LoanTransaction) -> RepoResult<()>;
    fn get_loan(&self, id: LoanId) -> RepoResult<Option<LoanTransaction>>;
    fn list_loans(&self, query: &LoanListQuery) -> RepoResult<Vec<LoanTransaction>>;
    /// Non-returned loans whose due date is strictly before `on`.
    fn list_past_due(&self, on: NaiveDate) -> RepoResult<Vec<LoanTransaction>>;
    /// Deletes a loan and, by cascade, its line items.
    fn delete_loan(&self, id: LoanId) -> RepoResult<()>;

    fn create_line(&self, line: &LineItem) -> RepoResult<LineItemId>;
    /// Updates return date, fine and notes.
    fn update_line(&self, line: &LineItem) -> RepoResult<()>;
    fn get_line(&self, id: LineItemId) -> RepoResult<Option<LineItem>>;
    fn list_lines(&self, scope: LineScope) -> RepoResult<Vec<LineItem>>;
}

/// SQLite-backed loan repository.
pub struct SqliteLoanRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLoanRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }

    fn query_loans(&self, sql: &str, bind_values: Vec<Value>) -> RepoResult<Vec<LoanTransaction>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut loans = Vec::new();
        while let Some(row) = rows.next()? {
            loans.push(parse_loan_row(row)?);
        }
        Ok(loans)
    }
}

impl LoanRepository for SqliteLoanRepository<'_> {
    fn create_loan(&self, loan: &LoanTransaction) -> RepoResult<LoanId> {
        self.conn.execute(
            "INSERT INTO loans (
                loan_uuid,
                member_uuid,
                borrow_date,
                due_date,
                status,
                return_date,
                notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                loan.id.to_string(),
                loan.member_id.to_string(),
                loan.borrow_date,
                loan.due_date,
                loan.status.as_str(),
                loan.return_date,
                loan.notes.as_deref(),
            ],
        )?;
        Ok(loan.id)
    }

    fn update_loan(&self, loan: &LoanTransaction) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE loans
             SET
                due_date = ?1,
                status = ?2,
                return_date = ?3,
                notes = ?4,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE loan_uuid = ?5;",
            params![
                loan.due_date,
                loan.status.as_str(),
                loan.return_date,
                loan.notes.as_deref(),
                loan.id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::Loan,
                id: loan.id,
            });
        }
        Ok(())
    }

    fn get_loan(&self, id: LoanId) -> RepoResult<Option<LoanTransaction>> {
        let mut loans = self.query_loans(
            &format!("{LOAN_SELECT_SQL} WHERE loan_uuid = ?;"),
            vec![Value::Text(id.to_string())],
        )?;
        Ok(loans.pop())
    }

    fn list_loans(&self, query: &LoanListQuery) -> RepoResult<Vec<LoanTransaction>> {
        let mut sql = format!("{LOAN_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(member_id) = query.member_id {
            sql.push_str(" AND member_uuid = ?");
            bind_values.push(Value::Text(member_id.to_string()));
        }
        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            bind_values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(from) = query.borrowed_from {
            sql.push_str(" AND borrow_date >= ?");
            bind_values.push(Value::Text(from.to_string()));
        }
        if let Some(to) = query.borrowed_to {
            sql.push_str(" AND borrow_date <= ?");
            bind_values.push(Value::Text(to.to_string()));
        }

        sql.push_str(" ORDER BY borrow_date DESC, created_at DESC, loan_uuid ASC");
        query.page.push_sql(&mut sql, &mut bind_values);
        self.query_loans(&sql, bind_values)
    }

    fn list_past_due(&self, on: NaiveDate) -> RepoResult<Vec<LoanTransaction>> {
        self.query_loans(
            &format!(
                "{LOAN_SELECT_SQL}
                 WHERE status != 'returned'
                   AND due_date < ?
                 ORDER BY due_date ASC, loan_uuid ASC;"
            ),
            vec![Value::Text(on.to_string())],
        )
    }

    fn delete_loan(&self, id: LoanId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM loans WHERE loan_uuid = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::Loan,
                id,
            });
        }
        Ok(())
    }

    fn create_line(&self, line: &LineItem) -> RepoResult<LineItemId> {
        self.conn.execute(
            "INSERT INTO line_items (
                line_uuid,
                loan_uuid,
                copy_uuid,
                actual_return_date,
                fine,
                notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                line.id.to_string(),
                line.loan_id.to_string(),
                line.copy_id.to_string(),
                line.actual_return_date,
                line.fine.to_string(),
                line.notes.as_deref(),
            ],
        )?;
        Ok(line.id)
    }

    fn update_line(&self, line: &LineItem) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE line_items
             SET
                actual_return_date = ?1,
                fine = ?2,
                notes = ?3,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE line_uuid = ?4;",
            params![
                line.actual_return_date,
                line.fine.to_string(),
                line.notes.as_deref(),
                line.id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::LineItem,
                id: line.id,
            });
        }
        Ok(())
    }

    fn get_line(&self, id: LineItemId) -> RepoResult<Option<LineItem>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{LINE_SELECT_SQL} WHERE li.line_uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_line_row(row)?));
        }
        Ok(None)
    }

    fn list_lines(&self, scope: LineScope) -> RepoResult<Vec<LineItem>> {
        let (filter, id) = match scope {
            LineScope::Loan(id) => ("WHERE li.loan_uuid = ?1", id),
            LineScope::Copy(id) => ("WHERE li.copy_uuid = ?1", id),
            LineScope::Title(id) => (
                "INNER JOIN copies c ON c.copy_uuid = li.copy_uuid
                 WHERE c.title_uuid = ?1",
                id,
            ),
            LineScope::Member(id) => (
                "INNER JOIN loans l ON l.loan_uuid = li.loan_uuid
                 WHERE l.member_uuid = ?1",
                id,
            ),
        };
        let mut stmt = self.conn.prepare(&format!(
            "{LINE_SELECT_SQL} {filter} ORDER BY li.created_at ASC, li.rowid ASC;"
        ))?;
        let mut rows = stmt.query([id.to_string()])?;
        let mut lines = Vec::new();
        while let Some(row) = rows.next()? {
            lines.push(parse_line_row(row)?);
        }
        Ok(lines)
    }
}

fn parse_loan_row(row: &Row<'_>) -> RepoResult<LoanTransaction> {
    let id_text: String = row.get("loan_uuid")?;
    let member_text: String = row.get("member_uuid")?;
    let status_text: String = row.get("status")?;
    Ok(LoanTransaction {
        id: parse_uuid(&id_text, "loans.loan_uuid")?,
        member_id: parse_uuid(&member_text, "loans.member_uuid")?,
        borrow_date: row.get("borrow_date")?,
        due_date: row.get("due_date")?,
        status: parse_enum(&status_text, "loans.status", LoanStatus::parse)?,
        return_date: row.get("return_date")?,
        notes: row.get("notes")?,
    })
}

fn parse_line_row(row: &Row<'_>) -> RepoResult<LineItem> {
    let id_text: String = row.get("line_uuid")?;
    let loan_text: String = row.get("loan_uuid")?;
    let copy_text: String = row.get("copy_uuid")?;
    let fine_text: String = row.get("fine")?;
    let fine = parse_decimal(&fine_text, "line_items.fine")?;
    if fine.is_sign_negative() {
        return Err(RepoError::InvalidData(format!(
            "negative fine `{fine_text}` in line_items.fine"
        )));
    }
    Ok(LineItem {
        id: parse_uuid(&id_text, "line_items.line_uuid")?,
        loan_id: parse_uuid(&loan_text, "line_items.loan_uuid")?,
        copy_id: parse_uuid(&copy_text, "line_items.copy_uuid")?,
        actual_return_date: row.get("actual_return_date")?,
        fine,
        notes: row.get("notes")?,
    })
}

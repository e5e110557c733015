//! Read-only circulation counters and reports for dashboards.
//!
//! # Responsibility
//! - Aggregate catalog, loan and member counts in one snapshot read.
//! - Report outstanding fines, members who owe or hold overdue loans and
//!   title borrowing popularity.
//!
//! # Invariants
//! - Read-only; never mutates persisted state.
//! - Fine sums are computed with exact decimals, never SQL floats.

use super::{parse_decimal, parse_uuid, RepoResult};
use crate::model::catalog::TitleId;
use crate::model::member::MemberId;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

/// Circulation snapshot counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OverviewStats {
    pub titles: i64,
    pub copies: i64,
    pub borrowed_copies: i64,
    pub damaged_copies: i64,
    pub lost_copies: i64,
    pub overdue_loans: i64,
    pub active_members: i64,
}

/// Outstanding fine totals across all line items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FinancialStats {
    /// Sum of every positive line fine not yet settled.
    pub unpaid_fines: Decimal,
    pub fined_lines: i64,
}

/// Member who owes a fine or holds an overdue loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlaggedMember {
    pub member_id: MemberId,
    pub code: String,
    pub full_name: String,
    pub unpaid_fine: Decimal,
    pub overdue_loans: i64,
}

/// How often a title's copies have been lent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleUsage {
    pub title_id: TitleId,
    pub code: String,
    pub title: String,
    pub borrow_count: i64,
}

/// Everything the `stats` command prints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CirculationReport {
    pub overview: OverviewStats,
    pub financial: FinancialStats,
    pub flagged_members: Vec<FlaggedMember>,
    pub top_titles: Vec<TitleUsage>,
    pub never_borrowed: Vec<TitleUsage>,
}

/// Reads all overview counters in a single statement.
pub fn overview_stats(conn: &Connection) -> RepoResult<OverviewStats> {
    let stats = conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM titles),
            (SELECT COUNT(*) FROM copies),
            (SELECT COUNT(*) FROM copies WHERE status = 'borrowed'),
            (SELECT COUNT(*) FROM copies WHERE status = 'damaged'),
            (SELECT COUNT(*) FROM copies WHERE status = 'lost'),
            (SELECT COUNT(*) FROM loans WHERE status = 'overdue'),
            (SELECT COUNT(*) FROM members WHERE status = 'active');",
        [],
        |row| {
            Ok(OverviewStats {
                titles: row.get(0)?,
                copies: row.get(1)?,
                borrowed_copies: row.get(2)?,
                damaged_copies: row.get(3)?,
                lost_copies: row.get(4)?,
                overdue_loans: row.get(5)?,
                active_members: row.get(6)?,
            })
        },
    )?;
    Ok(stats)
}

/// Sums unpaid line fines.
pub fn financial_stats(conn: &Connection) -> RepoResult<FinancialStats> {
    let mut stats = FinancialStats::default();
    for (_, fine) in member_fines(conn)? {
        stats.unpaid_fines += fine;
        stats.fined_lines += 1;
    }
    Ok(stats)
}

/// Members with a positive unpaid fine or at least one overdue loan,
/// ordered by member code.
pub fn flagged_members(conn: &Connection) -> RepoResult<Vec<FlaggedMember>> {
    let mut owed: HashMap<MemberId, Decimal> = HashMap::new();
    for (member_id, fine) in member_fines(conn)? {
        *owed.entry(member_id).or_default() += fine;
    }

    let mut stmt = conn.prepare(
        "SELECT
            m.member_uuid,
            m.code,
            m.full_name,
            (
                SELECT COUNT(*)
                FROM loans l
                WHERE l.member_uuid = m.member_uuid
                  AND l.status = 'overdue'
            ) AS overdue_loans
         FROM members m
         ORDER BY m.code ASC;",
    )?;
    let mut rows = stmt.query([])?;
    let mut flagged = Vec::new();
    while let Some(row) = rows.next()? {
        let id_text: String = row.get(0)?;
        let member_id = parse_uuid(&id_text, "members.member_uuid")?;
        let unpaid_fine = owed.get(&member_id).copied().unwrap_or_default();
        let overdue_loans: i64 = row.get(3)?;
        if unpaid_fine > Decimal::ZERO || overdue_loans > 0 {
            flagged.push(FlaggedMember {
                member_id,
                code: row.get(1)?,
                full_name: row.get(2)?,
                unpaid_fine,
                overdue_loans,
            });
        }
    }
    Ok(flagged)
}

/// Titles ranked by lent line items, most borrowed first. Titles never
/// lent are left out.
pub fn top_borrowed_titles(conn: &Connection, limit: u32) -> RepoResult<Vec<TitleUsage>> {
    let mut stmt = conn.prepare(
        "SELECT t.title_uuid, t.code, t.title, COUNT(li.line_uuid) AS borrow_count
         FROM titles t
         INNER JOIN copies c ON c.title_uuid = t.title_uuid
         INNER JOIN line_items li ON li.copy_uuid = c.copy_uuid
         GROUP BY t.title_uuid
         ORDER BY borrow_count DESC, t.code ASC
         LIMIT ?1;",
    )?;
    let mut rows = stmt.query(params![i64::from(limit)])?;
    let mut titles = Vec::new();
    while let Some(row) = rows.next()? {
        titles.push(parse_usage_row(row)?);
    }
    Ok(titles)
}

/// Titles none of whose copies has ever been lent.
pub fn never_borrowed_titles(conn: &Connection) -> RepoResult<Vec<TitleUsage>> {
    let mut stmt = conn.prepare(
        "SELECT t.title_uuid, t.code, t.title, 0 AS borrow_count
         FROM titles t
         WHERE NOT EXISTS (
            SELECT 1
            FROM copies c
            INNER JOIN line_items li ON li.copy_uuid = c.copy_uuid
            WHERE c.title_uuid = t.title_uuid
         )
         ORDER BY t.code ASC;",
    )?;
    let mut rows = stmt.query([])?;
    let mut titles = Vec::new();
    while let Some(row) = rows.next()? {
        titles.push(parse_usage_row(row)?);
    }
    Ok(titles)
}

/// Collects every report section.
pub fn circulation_report(conn: &Connection, top_limit: u32) -> RepoResult<CirculationReport> {
    Ok(CirculationReport {
        overview: overview_stats(conn)?,
        financial: financial_stats(conn)?,
        flagged_members: flagged_members(conn)?,
        top_titles: top_borrowed_titles(conn, top_limit)?,
        never_borrowed: never_borrowed_titles(conn)?,
    })
}

/// Positive line fines paired with the owning member.
fn member_fines(conn: &Connection) -> RepoResult<Vec<(MemberId, Decimal)>> {
    let mut stmt = conn.prepare(
        "SELECT l.member_uuid, li.fine
         FROM line_items li
         INNER JOIN loans l ON l.loan_uuid = li.loan_uuid;",
    )?;
    let mut rows = stmt.query([])?;
    let mut fines = Vec::new();
    while let Some(row) = rows.next()? {
        let id_text: String = row.get(0)?;
        let fine_text: String = row.get(1)?;
        let fine = parse_decimal(&fine_text, "line_items.fine")?;
        if fine > Decimal::ZERO {
            fines.push((parse_uuid(&id_text, "loans.member_uuid")?, fine));
        }
    }
    Ok(fines)
}

fn parse_usage_row(row: &rusqlite::Row<'_>) -> RepoResult<TitleUsage> {
    let id_text: String = row.get(0)?;
    Ok(TitleUsage {
        title_id: parse_uuid(&id_text, "titles.title_uuid")?,
        code: row.get(1)?,
        title: row.get(2)?,
        borrow_count: row.get(3)?,
    })
}

//! Member repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD and filtered listings over `members`.
//! - Provide single-statement counter adjustments for the membership guard.
//! - Provide the counter audit query comparing the cached counter with the
//!   open line items actually persisted.
//!
//! # Invariants
//! - `update_member` never writes `active_borrow_count`.
//! - Counter reservation is one conditional UPDATE, never read-then-write.

use super::{
    ensure_schema_ready, parse_enum, parse_uuid, EntityKind, Page, RepoError, RepoResult,
};
use crate::model::member::{Member, MemberId, MemberStatus};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const MEMBER_SELECT_SQL: &str = "SELECT
    member_uuid,
    code,
    full_name,
    email,
    phone,
    address,
    status,
    registration_date,
    expiry_date,
    active_borrow_count
FROM members";

/// Query options for listing members.
#[derive(Debug, Clone, Default)]
pub struct MemberListQuery {
    pub status: Option<MemberStatus>,
    /// Case-insensitive substring match on code, name or email.
    pub text: Option<String>,
    pub page: Page,
}

/// Stored counter next to the recount of open line items for one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowCountAudit {
    pub member_id: MemberId,
    pub stored: u32,
    pub actual: u32,
}

impl BorrowCountAudit {
    pub fn is_consistent(&self) -> bool {
        self.stored == self.actual
    }
}

/// Outcome of a conditional counter increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterUpdate {
    /// Increment applied; carries the new counter value.
    Applied(u32),
    /// Increment would exceed the cap; carries the unchanged counter value.
    Rejected(u32),
}

/// Repository interface for members.
pub trait MemberRepository {
    fn create_member(&self, member: &Member) -> RepoResult<MemberId>;
    /// Updates profile and membership fields. The borrow counter is untouched.
    fn update_member(&self, member: &Member) -> RepoResult<()>;
    fn get_member(&self, id: MemberId) -> RepoResult<Option<Member>>;
    fn find_member_by_code(&self, code: &str) -> RepoResult<Option<Member>>;
    fn list_members(&self, query: &MemberListQuery) -> RepoResult<Vec<Member>>;
    fn delete_member(&self, id: MemberId) -> RepoResult<()>;

    /// Adds `count` to the counter if the result stays within `cap`.
    fn try_increment_borrow_count(
        &self,
        id: MemberId,
        count: u32,
        cap: u32,
    ) -> RepoResult<CounterUpdate>;
    /// Subtracts `count` from the counter, clamped at zero. Returns the new value.
    fn decrement_borrow_count(&self, id: MemberId, count: u32) -> RepoResult<u32>;
    /// Overwrites the counter. Only used by counter repair.
    fn set_borrow_count(&self, id: MemberId, value: u32) -> RepoResult<()>;
    /// Number of open line items across all loans of the member.
    fn count_open_lines(&self, id: MemberId) -> RepoResult<u32>;
    /// Stored vs recounted borrow counters for every member.
    fn audit_borrow_counts(&self) -> RepoResult<Vec<BorrowCountAudit>>;
}

/// SQLite-backed member repository.
pub struct SqliteMemberRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMemberRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }

    fn not_found(id: MemberId) -> RepoError {
        RepoError::NotFound {
            entity: EntityKind::Member,
            id,
        }
    }

    fn borrow_count(&self, id: MemberId) -> RepoResult<Option<u32>> {
        let value = self
            .conn
            .query_row(
                "SELECT active_borrow_count FROM members WHERE member_uuid = ?1;",
                [id.to_string()],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        Ok(value)
    }
}

impl MemberRepository for SqliteMemberRepository<'_> {
    fn create_member(&self, member: &Member) -> RepoResult<MemberId> {
        member.validate()?;
        self.conn.execute(
            "INSERT INTO members (
                member_uuid,
                code,
                full_name,
                email,
                phone,
                address,
                status,
                registration_date,
                expiry_date,
                active_borrow_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                member.id.to_string(),
                member.code.trim(),
                member.full_name.as_str(),
                member.email.trim(),
                member.phone.as_deref(),
                member.address.as_deref(),
                member.status.as_str(),
                member.registration_date,
                member.expiry_date,
                member.active_borrow_count,
            ],
        )?;
        Ok(member.id)
    }

    fn update_member(&self, member: &Member) -> RepoResult<()> {
        member.validate()?;
        let changed = self.conn.execute(
            "UPDATE members
             SET
                code = ?1,
                full_name = ?2,
                email = ?3,
                phone = ?4,
                address = ?5,
                status = ?6,
                registration_date = ?7,
                expiry_date = ?8,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE member_uuid = ?9;",
            params![
                member.code.trim(),
                member.full_name.as_str(),
                member.email.trim(),
                member.phone.as_deref(),
                member.address.as_deref(),
                member.status.as_str(),
                member.registration_date,
                member.expiry_date,
                member.id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(Self::not_found(member.id));
        }
        Ok(())
    }

    fn get_member(&self, id: MemberId) -> RepoResult<Option<Member>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{MEMBER_SELECT_SQL} WHERE member_uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_member_row(row)?));
        }
        Ok(None)
    }

    fn find_member_by_code(&self, code: &str) -> RepoResult<Option<Member>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{MEMBER_SELECT_SQL} WHERE code = ?1;"))?;
        let mut rows = stmt.query([code.trim()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_member_row(row)?));
        }
        Ok(None)
    }

    fn list_members(&self, query: &MemberListQuery) -> RepoResult<Vec<Member>> {
        let mut sql = format!("{MEMBER_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            bind_values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(text) = query.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            sql.push_str(
                " AND (LOWER(code) LIKE ? OR LOWER(full_name) LIKE ? OR LOWER(email) LIKE ?)",
            );
            let pattern = format!("%{}%", text.to_lowercase());
            for _ in 0..3 {
                bind_values.push(Value::Text(pattern.clone()));
            }
        }

        sql.push_str(" ORDER BY code ASC, member_uuid ASC");
        query.page.push_sql(&mut sql, &mut bind_values);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut members = Vec::new();
        while let Some(row) = rows.next()? {
            members.push(parse_member_row(row)?);
        }
        Ok(members)
    }

    fn delete_member(&self, id: MemberId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM members WHERE member_uuid = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    fn try_increment_borrow_count(
        &self,
        id: MemberId,
        count: u32,
        cap: u32,
    ) -> RepoResult<CounterUpdate> {
        let changed = self.conn.execute(
            "UPDATE members
             SET
                active_borrow_count = active_borrow_count + ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE member_uuid = ?1
               AND active_borrow_count + ?2 <= ?3;",
            params![id.to_string(), count, cap],
        )?;

        let current = self.borrow_count(id)?.ok_or_else(|| Self::not_found(id))?;
        if changed == 0 {
            return Ok(CounterUpdate::Rejected(current));
        }
        Ok(CounterUpdate::Applied(current))
    }

    fn decrement_borrow_count(&self, id: MemberId, count: u32) -> RepoResult<u32> {
        let changed = self.conn.execute(
            "UPDATE members
             SET
                active_borrow_count = MAX(active_borrow_count - ?2, 0),
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE member_uuid = ?1;",
            params![id.to_string(), count],
        )?;
        if changed == 0 {
            return Err(Self::not_found(id));
        }
        self.borrow_count(id)?.ok_or_else(|| Self::not_found(id))
    }

    fn set_borrow_count(&self, id: MemberId, value: u32) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE members
             SET
                active_borrow_count = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE member_uuid = ?1;",
            params![id.to_string(), value],
        )?;
        if changed == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    fn count_open_lines(&self, id: MemberId) -> RepoResult<u32> {
        let count = self.conn.query_row(
            "SELECT COUNT(*)
             FROM line_items li
             INNER JOIN loans l ON l.loan_uuid = li.loan_uuid
             WHERE l.member_uuid = ?1
               AND li.actual_return_date IS NULL;",
            [id.to_string()],
            |row| row.get::<_, u32>(0),
        )?;
        Ok(count)
    }

    fn audit_borrow_counts(&self) -> RepoResult<Vec<BorrowCountAudit>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                m.member_uuid,
                m.active_borrow_count,
                (
                    SELECT COUNT(*)
                    FROM line_items li
                    INNER JOIN loans l ON l.loan_uuid = li.loan_uuid
                    WHERE l.member_uuid = m.member_uuid
                      AND li.actual_return_date IS NULL
                ) AS open_lines
             FROM members m
             ORDER BY m.code ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut audits = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get(0)?;
            audits.push(BorrowCountAudit {
                member_id: parse_uuid(&id_text, "members.member_uuid")?,
                stored: row.get(1)?,
                actual: row.get(2)?,
            });
        }
        Ok(audits)
    }
}

fn parse_member_row(row: &Row<'_>) -> RepoResult<Member> {
    let id_text: String = row.get("member_uuid")?;
    let status_text: String = row.get("status")?;
    let member = Member {
        id: parse_uuid(&id_text, "members.member_uuid")?,
        code: row.get("code")?,
        full_name: row.get("full_name")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
        address: row.get("address")?,
        status: parse_enum(&status_text, "members.status", MemberStatus::parse)?,
        registration_date: row.get("registration_date")?,
        expiry_date: row.get("expiry_date")?,
        active_borrow_count: row.get("active_borrow_count")?,
    };
    member.validate()?;
    Ok(member)
}

//! Member administration.
//!
//! The borrow counter is never taken from caller input: registration
//! starts it at zero and updates leave it alone.

use crate::model::member::{Member, MemberId};
use crate::repo::loan_repo::LineScope;
use crate::repo::member_repo::{MemberListQuery, MemberRepository, SqliteMemberRepository};
use crate::repo::EntityKind;
use crate::service::catalog_service::ensure_released;
use crate::service::error::{ServiceError, ServiceResult};
use crate::service::run_immediate;
use log::info;
use rusqlite::Connection;

pub struct MemberService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> MemberService<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Registers a member with an empty borrow counter.
    pub fn register(&self, member: &Member) -> ServiceResult<Member> {
        let mut member = member.clone();
        member.active_borrow_count = 0;
        run_immediate(self.conn, "member_register", |conn| {
            let repo = SqliteMemberRepository::new(conn);
            let id = repo.create_member(&member)?;
            info!("event=member_register module=member status=ok member={id}");
            load_member(&repo, id)
        })
    }

    /// Updates profile and membership fields.
    pub fn update(&self, member: &Member) -> ServiceResult<Member> {
        run_immediate(self.conn, "member_update", |conn| {
            let repo = SqliteMemberRepository::new(conn);
            repo.update_member(member)?;
            load_member(&repo, member.id)
        })
    }

    pub fn get(&self, id: MemberId) -> ServiceResult<Member> {
        load_member(&SqliteMemberRepository::new(self.conn), id)
    }

    pub fn find_by_code(&self, code: &str) -> ServiceResult<Option<Member>> {
        Ok(SqliteMemberRepository::new(self.conn).find_member_by_code(code)?)
    }

    pub fn list(&self, query: &MemberListQuery) -> ServiceResult<Vec<Member>> {
        Ok(SqliteMemberRepository::new(self.conn).list_members(query)?)
    }

    /// Deletes a member and their closed, settled loans.
    ///
    /// # Errors
    /// - `HasOpenCopies` while the member still holds copies.
    /// - `UnpaidFine` while any of their lines carries a fine.
    pub fn delete(&self, id: MemberId) -> ServiceResult<()> {
        run_immediate(self.conn, "member_delete", |conn| {
            ensure_released(conn, LineScope::Member(id), EntityKind::Member, id)?;
            SqliteMemberRepository::new(conn).delete_member(id)?;
            info!("event=member_delete module=member status=ok member={id}");
            Ok(())
        })
    }
}

fn load_member(repo: &impl MemberRepository, id: MemberId) -> ServiceResult<Member> {
    repo.get_member(id)?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Member, id))
}

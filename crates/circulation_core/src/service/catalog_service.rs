//! Catalog administration: titles and copies.
//!
//! # Invariants
//! - Copies are never created as `Borrowed`; only a loan can borrow one.
//! - Titles and copies referenced by an open line item or an unpaid fine
//!   cannot be deleted.

use crate::model::catalog::{Copy, CopyId, CopyStatus, Title, TitleId};
use crate::repo::catalog_repo::{
    CatalogRepository, CopyListQuery, SqliteCatalogRepository, TitleListQuery,
};
use crate::repo::loan_repo::{LineScope, LoanRepository, SqliteLoanRepository};
use crate::repo::EntityKind;
use crate::service::error::{ServiceError, ServiceResult};
use crate::service::run_immediate;
use log::info;
use rusqlite::Connection;
use rust_decimal::Decimal;

pub struct CatalogService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> CatalogService<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn repo(&self) -> SqliteCatalogRepository<'conn> {
        SqliteCatalogRepository::new(self.conn)
    }

    pub fn create_title(&self, title: &Title) -> ServiceResult<Title> {
        run_immediate(self.conn, "title_create", |conn| {
            let repo = SqliteCatalogRepository::new(conn);
            let id = repo.create_title(title)?;
            info!("event=title_create module=catalog status=ok title={id}");
            load_title(&repo, id)
        })
    }

    pub fn update_title(&self, title: &Title) -> ServiceResult<Title> {
        run_immediate(self.conn, "title_update", |conn| {
            let repo = SqliteCatalogRepository::new(conn);
            repo.update_title(title)?;
            load_title(&repo, title.id)
        })
    }

    pub fn get_title(&self, id: TitleId) -> ServiceResult<Title> {
        load_title(&self.repo(), id)
    }

    pub fn list_titles(&self, query: &TitleListQuery) -> ServiceResult<Vec<Title>> {
        Ok(self.repo().list_titles(query)?)
    }

    /// Deletes a title together with its copies.
    pub fn delete_title(&self, id: TitleId) -> ServiceResult<()> {
        run_immediate(self.conn, "title_delete", |conn| {
            ensure_released(conn, LineScope::Title(id), EntityKind::Title, id)?;
            SqliteCatalogRepository::new(conn).delete_title(id)?;
            info!("event=title_delete module=catalog status=ok title={id}");
            Ok(())
        })
    }

    /// Adds a copy to an existing title.
    ///
    /// # Errors
    /// - `InvalidState` when the copy is submitted as borrowed.
    /// - `NotFound` when the owning title does not exist.
    pub fn add_copy(&self, copy: &Copy) -> ServiceResult<Copy> {
        if copy.status == CopyStatus::Borrowed {
            return Err(ServiceError::InvalidState(
                "a new copy cannot start out borrowed".to_string(),
            ));
        }
        run_immediate(self.conn, "copy_create", |conn| {
            let repo = SqliteCatalogRepository::new(conn);
            load_title(&repo, copy.title_id)?;
            let id = repo.create_copy(copy)?;
            info!(
                "event=copy_create module=catalog status=ok copy={id} title={}",
                copy.title_id
            );
            load_copy(&repo, id)
        })
    }

    /// Edits label and location. Status is owned by the lending services.
    pub fn update_copy(&self, copy: &Copy) -> ServiceResult<Copy> {
        run_immediate(self.conn, "copy_update", |conn| {
            let repo = SqliteCatalogRepository::new(conn);
            repo.update_copy(copy)?;
            load_copy(&repo, copy.id)
        })
    }

    pub fn get_copy(&self, id: CopyId) -> ServiceResult<Copy> {
        load_copy(&self.repo(), id)
    }

    pub fn list_copies(&self, query: &CopyListQuery) -> ServiceResult<Vec<Copy>> {
        Ok(self.repo().list_copies(query)?)
    }

    pub fn delete_copy(&self, id: CopyId) -> ServiceResult<()> {
        run_immediate(self.conn, "copy_delete", |conn| {
            ensure_released(conn, LineScope::Copy(id), EntityKind::Copy, id)?;
            SqliteCatalogRepository::new(conn).delete_copy(id)?;
            info!("event=copy_delete module=catalog status=ok copy={id}");
            Ok(())
        })
    }
}

/// Rejects deletion while lines in `scope` are open or carry fines.
pub(crate) fn ensure_released(
    conn: &Connection,
    scope: LineScope,
    entity: EntityKind,
    id: uuid::Uuid,
) -> ServiceResult<()> {
    let lines = SqliteLoanRepository::new(conn).list_lines(scope)?;
    if lines.iter().any(|line| line.is_open()) {
        return Err(ServiceError::HasOpenCopies { entity, id });
    }
    let total: Decimal = lines.iter().map(|line| line.fine).sum();
    if total > Decimal::ZERO {
        return Err(ServiceError::UnpaidFine { entity, id, total });
    }
    Ok(())
}

fn load_title(repo: &impl CatalogRepository, id: TitleId) -> ServiceResult<Title> {
    repo.get_title(id)?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Title, id))
}

fn load_copy(repo: &impl CatalogRepository, id: CopyId) -> ServiceResult<Copy> {
    repo.get_copy(id)?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Copy, id))
}

//! Catalog repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD and filtered listings over `titles` and `copies`.
//! - Provide the conditional copy-status transition used by the inventory
//!   ledger.
//!
//! # Invariants
//! - `update_copy` edits label/location only; status changes go through
//!   `transition_copy_status`.
//! - Listings are deterministic: titles by `code`, copies by `label`.

use super::{
    ensure_schema_ready, parse_enum, parse_uuid, EntityKind, Page, RepoError, RepoResult,
};
use crate::model::catalog::{Copy, CopyId, CopyStatus, Title, TitleId};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const TITLE_SELECT_SQL: &str = "SELECT
    title_uuid,
    code,
    title,
    author,
    publisher,
    publish_year,
    category,
    description
FROM titles";

const COPY_SELECT_SQL: &str = "SELECT
    copy_uuid,
    title_uuid,
    label,
    location,
    status
FROM copies";

/// Query options for listing titles.
#[derive(Debug, Clone, Default)]
pub struct TitleListQuery {
    /// Case-insensitive substring match on code, title or author.
    pub text: Option<String>,
    pub category: Option<String>,
    pub page: Page,
}

/// Query options for listing copies.
#[derive(Debug, Clone, Default)]
pub struct CopyListQuery {
    pub title_id: Option<TitleId>,
    pub status: Option<CopyStatus>,
    pub page: Page,
}

/// Repository interface for titles and their physical copies.
pub trait CatalogRepository {
    fn create_title(&self, title: &Title) -> RepoResult<TitleId>;
    fn update_title(&self, title: &Title) -> RepoResult<()>;
    fn get_title(&self, id: TitleId) -> RepoResult<Option<Title>>;
    fn list_titles(&self, query: &TitleListQuery) -> RepoResult<Vec<Title>>;
    /// Deletes a title and, by cascade, its copies.
    fn delete_title(&self, id: TitleId) -> RepoResult<()>;

    fn create_copy(&self, copy: &Copy) -> RepoResult<CopyId>;
    /// Updates label and location. Status is left untouched.
    fn update_copy(&self, copy: &Copy) -> RepoResult<()>;
    fn get_copy(&self, id: CopyId) -> RepoResult<Option<Copy>>;
    fn list_copies(&self, query: &CopyListQuery) -> RepoResult<Vec<Copy>>;
    fn delete_copy(&self, id: CopyId) -> RepoResult<()>;

    /// Sets copy status to `next` when the current status equals `expected`
    /// (or unconditionally when `expected` is `None`).
    ///
    /// Returns `false` when the copy exists but its status did not match.
    /// Returns `NotFound` when the copy does not exist.
    fn transition_copy_status(
        &self,
        id: CopyId,
        expected: Option<CopyStatus>,
        next: CopyStatus,
    ) -> RepoResult<bool>;
}

/// SQLite-backed catalog repository.
pub struct SqliteCatalogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCatalogRepository<'conn> {
    /// Creates a repository without checking the schema version.
    ///
    /// Used by services that already hold a transaction on a bootstrapped
    /// connection.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

impl CatalogRepository for SqliteCatalogRepository<'_> {
    fn create_title(&self, title: &Title) -> RepoResult<TitleId> {
        title.validate()?;
        self.conn.execute(
            "INSERT INTO titles (
                title_uuid,
                code,
                title,
                author,
                publisher,
                publish_year,
                category,
                description
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                title.id.to_string(),
                title.code.trim(),
                title.title.as_str(),
                title.author.as_str(),
                title.publisher.as_deref(),
                title.publish_year,
                title.category.as_deref(),
                title.description.as_deref(),
            ],
        )?;
        Ok(title.id)
    }

    fn update_title(&self, title: &Title) -> RepoResult<()> {
        title.validate()?;
        let changed = self.conn.execute(
            "UPDATE titles
             SET
                code = ?1,
                title = ?2,
                author = ?3,
                publisher = ?4,
                publish_year = ?5,
                category = ?6,
                description = ?7,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE title_uuid = ?8;",
            params![
                title.code.trim(),
                title.title.as_str(),
                title.author.as_str(),
                title.publisher.as_deref(),
                title.publish_year,
                title.category.as_deref(),
                title.description.as_deref(),
                title.id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::Title,
                id: title.id,
            });
        }
        Ok(())
    }

    fn get_title(&self, id: TitleId) -> RepoResult<Option<Title>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TITLE_SELECT_SQL} WHERE title_uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_title_row(row)?));
        }
        Ok(None)
    }

    fn list_titles(&self, query: &TitleListQuery) -> RepoResult<Vec<Title>> {
        let mut sql = format!("{TITLE_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(text) = query.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            sql.push_str(
                " AND (LOWER(code) LIKE ? OR LOWER(title) LIKE ? OR LOWER(author) LIKE ?)",
            );
            let pattern = format!("%{}%", text.to_lowercase());
            for _ in 0..3 {
                bind_values.push(Value::Text(pattern.clone()));
            }
        }
        if let Some(category) = query.category.as_deref() {
            sql.push_str(" AND category = ?");
            bind_values.push(Value::Text(category.to_string()));
        }

        sql.push_str(" ORDER BY code ASC, title_uuid ASC");
        query.page.push_sql(&mut sql, &mut bind_values);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut titles = Vec::new();
        while let Some(row) = rows.next()? {
            titles.push(parse_title_row(row)?);
        }
        Ok(titles)
    }

    fn delete_title(&self, id: TitleId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM titles WHERE title_uuid = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::Title,
                id,
            });
        }
        Ok(())
    }

    fn create_copy(&self, copy: &Copy) -> RepoResult<CopyId> {
        copy.validate()?;
        self.conn.execute(
            "INSERT INTO copies (
                copy_uuid,
                title_uuid,
                label,
                location,
                status
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                copy.id.to_string(),
                copy.title_id.to_string(),
                copy.label.trim(),
                copy.location.as_deref(),
                copy.status.as_str(),
            ],
        )?;
        Ok(copy.id)
    }

    fn update_copy(&self, copy: &Copy) -> RepoResult<()> {
        copy.validate()?;
        let changed = self.conn.execute(
            "UPDATE copies
             SET
                label = ?1,
                location = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE copy_uuid = ?3;",
            params![
                copy.label.trim(),
                copy.location.as_deref(),
                copy.id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::Copy,
                id: copy.id,
            });
        }
        Ok(())
    }

    fn get_copy(&self, id: CopyId) -> RepoResult<Option<Copy>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{COPY_SELECT_SQL} WHERE copy_uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_copy_row(row)?));
        }
        Ok(None)
    }

    fn list_copies(&self, query: &CopyListQuery) -> RepoResult<Vec<Copy>> {
        let mut sql = format!("{COPY_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(title_id) = query.title_id {
            sql.push_str(" AND title_uuid = ?");
            bind_values.push(Value::Text(title_id.to_string()));
        }
        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            bind_values.push(Value::Text(status.as_str().to_string()));
        }

        sql.push_str(" ORDER BY label ASC, copy_uuid ASC");
        query.page.push_sql(&mut sql, &mut bind_values);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut copies = Vec::new();
        while let Some(row) = rows.next()? {
            copies.push(parse_copy_row(row)?);
        }
        Ok(copies)
    }

    fn delete_copy(&self, id: CopyId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM copies WHERE copy_uuid = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::Copy,
                id,
            });
        }
        Ok(())
    }

    fn transition_copy_status(
        &self,
        id: CopyId,
        expected: Option<CopyStatus>,
        next: CopyStatus,
    ) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE copies
             SET
                status = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE copy_uuid = ?1
               AND (?3 IS NULL OR status = ?3);",
            params![
                id.to_string(),
                next.as_str(),
                expected.map(CopyStatus::as_str),
            ],
        )?;
        if changed == 1 {
            return Ok(true);
        }

        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM copies WHERE copy_uuid = ?1;",
                [id.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        match exists {
            Some(()) => Ok(false),
            None => Err(RepoError::NotFound {
                entity: EntityKind::Copy,
                id,
            }),
        }
    }
}

fn parse_title_row(row: &Row<'_>) -> RepoResult<Title> {
    let id_text: String = row.get("title_uuid")?;
    let title = Title {
        id: parse_uuid(&id_text, "titles.title_uuid")?,
        code: row.get("code")?,
        title: row.get("title")?,
        author: row.get("author")?,
        publisher: row.get("publisher")?,
        publish_year: row.get("publish_year")?,
        category: row.get("category")?,
        description: row.get("description")?,
    };
    title.validate()?;
    Ok(title)
}

fn parse_copy_row(row: &Row<'_>) -> RepoResult<Copy> {
    let id_text: String = row.get("copy_uuid")?;
    let title_text: String = row.get("title_uuid")?;
    let status_text: String = row.get("status")?;
    Ok(Copy {
        id: parse_uuid(&id_text, "copies.copy_uuid")?,
        title_id: parse_uuid(&title_text, "copies.title_uuid")?,
        label: row.get("label")?,
        location: row.get("location")?,
        status: parse_enum(&status_text, "copies.status", CopyStatus::parse)?,
    })
}

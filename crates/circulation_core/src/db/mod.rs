//! Storage bootstrap for the circulation ledger.
//!
//! Every connection the services use comes from [`open_db`] or
//! [`open_db_in_memory`], which leave it ready for concurrent lending:
//!
//! - foreign keys are enforced, so line items cannot outlive their loan or
//!   copy;
//! - writers that lose the IMMEDIATE lock race wait up to
//!   [`BUSY_TIMEOUT`] instead of failing with `SQLITE_BUSY`;
//! - the titles/copies/members and loans/line_items schemas are migrated to
//!   the version this binary understands, and a ledger written by a newer
//!   binary is refused.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, BUSY_TIMEOUT};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

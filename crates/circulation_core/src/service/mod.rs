//! Circulation use-case services.
//!
//! # Responsibility
//! - Compose repository primitives into the lending use cases: inventory
//!   ledger, membership guard, loan transactions, overdue sweep and
//!   catalog/member administration.
//! - Own the transactional boundary of every mutating use case.
//!
//! # Invariants
//! - Each mutating call runs inside one `BEGIN IMMEDIATE` transaction on the
//!   caller's connection; on error the transaction is dropped and rolled back.
//! - Errors are logged once, here, with their stable code.

use log::warn;
use rusqlite::{Connection, Transaction, TransactionBehavior};

pub mod catalog_service;
pub mod error;
pub mod fine_engine;
pub mod inventory_ledger;
pub mod loan_service;
pub mod member_service;
pub mod membership_guard;

use error::ServiceResult;

/// Runs `op` inside an IMMEDIATE transaction and commits on success.
pub(crate) fn run_immediate<T>(
    conn: &Connection,
    event: &'static str,
    op: impl FnOnce(&Connection) -> ServiceResult<T>,
) -> ServiceResult<T> {
    let result = commit_with(conn, op);
    if let Err(err) = &result {
        warn!(
            "event={event} status=error error_code={} error={}",
            err.code(),
            err
        );
    }
    result
}

fn commit_with<T>(
    conn: &Connection,
    op: impl FnOnce(&Connection) -> ServiceResult<T>,
) -> ServiceResult<T> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let value = op(&*tx)?;
    tx.commit()?;
    Ok(value)
}

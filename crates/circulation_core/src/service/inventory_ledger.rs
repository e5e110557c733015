//! Inventory ledger: copy status transitions.
//!
//! # Responsibility
//! - Move copies between shelf, loan and adjudicated states.
//!
//! # Invariants
//! - `mark_borrowed` is a single compare-and-set on the copy row; two
//!   concurrent borrowers of the same copy get exactly one winner.
//! - Only the status column is touched.

use crate::model::catalog::{AdjudicationOutcome, CopyId, CopyStatus};
use crate::repo::catalog_repo::CatalogRepository;
use crate::service::error::{ServiceError, ServiceResult};
use log::debug;

/// Copy status facade over a catalog repository.
pub struct InventoryLedger<R: CatalogRepository> {
    repo: R,
}

impl<R: CatalogRepository> InventoryLedger<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Flips an available copy to borrowed.
    ///
    /// # Errors
    /// - `NotFound` when the copy does not exist.
    /// - `InvalidState` when the copy is not available.
    pub fn mark_borrowed(&self, copy_id: CopyId) -> ServiceResult<()> {
        let applied = self.repo.transition_copy_status(
            copy_id,
            Some(CopyStatus::Available),
            CopyStatus::Borrowed,
        )?;
        if !applied {
            return Err(ServiceError::InvalidState(format!(
                "copy {copy_id} is not available"
            )));
        }
        debug!("event=copy_status module=ledger status=ok copy={copy_id} to=borrowed");
        Ok(())
    }

    /// Puts a copy back on the shelf regardless of its current status.
    pub fn mark_available(&self, copy_id: CopyId) -> ServiceResult<()> {
        self.repo
            .transition_copy_status(copy_id, None, CopyStatus::Available)?;
        debug!("event=copy_status module=ledger status=ok copy={copy_id} to=available");
        Ok(())
    }

    /// Takes a copy out of circulation as damaged or lost.
    pub fn mark_adjudicated(
        &self,
        copy_id: CopyId,
        outcome: AdjudicationOutcome,
    ) -> ServiceResult<()> {
        let next = outcome.copy_status();
        self.repo.transition_copy_status(copy_id, None, next)?;
        debug!(
            "event=copy_status module=ledger status=ok copy={copy_id} to={}",
            next.as_str()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::InventoryLedger;
    use crate::db::open_db_in_memory;
    use crate::model::catalog::{AdjudicationOutcome, Copy, CopyStatus, Title};
    use crate::repo::catalog_repo::{CatalogRepository, SqliteCatalogRepository};
    use crate::service::error::ServiceError;
    use uuid::Uuid;

    #[test]
    fn mark_borrowed_is_compare_and_set() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteCatalogRepository::try_new(&conn).unwrap();
        let title = Title::new("ISBN-1", "Dune", "Frank Herbert");
        repo.create_title(&title).unwrap();
        let copy = Copy::new(title.id, "C1");
        repo.create_copy(&copy).unwrap();

        let ledger = InventoryLedger::new(SqliteCatalogRepository::new(&conn));
        ledger.mark_borrowed(copy.id).unwrap();
        let second = ledger.mark_borrowed(copy.id).unwrap_err();
        assert!(matches!(second, ServiceError::InvalidState(_)));

        ledger
            .mark_adjudicated(copy.id, AdjudicationOutcome::Lost)
            .unwrap();
        let stored = repo.get_copy(copy.id).unwrap().unwrap();
        assert_eq!(stored.status, CopyStatus::Lost);

        ledger.mark_available(copy.id).unwrap();
        let stored = repo.get_copy(copy.id).unwrap().unwrap();
        assert_eq!(stored.status, CopyStatus::Available);
    }

    #[test]
    fn missing_copy_is_not_found() {
        let conn = open_db_in_memory().unwrap();
        let ledger = InventoryLedger::new(SqliteCatalogRepository::new(&conn));
        let err = ledger.mark_borrowed(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }
}

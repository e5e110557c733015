//! Catalog title and physical copy model.
//!
//! # Responsibility
//! - Define the logical work (`Title`) and its loanable instances (`Copy`).
//! - Define the copy status lattice used by the inventory ledger.
//!
//! # Invariants
//! - A copy references its title by id only; titles never embed copies.
//! - `CopyStatus::Borrowed` is only entered through the inventory ledger.
//! - Adjudication can only move a copy to `Damaged` or `Lost`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::{require_non_blank, ValidationError};

/// Stable identifier for a catalog title.
pub type TitleId = Uuid;

/// Stable identifier for one physical copy.
pub type CopyId = Uuid;

/// Logical work in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    pub id: TitleId,
    /// Unique external code (ISBN or local accession code).
    pub code: String,
    pub title: String,
    pub author: String,
    pub publisher: Option<String>,
    pub publish_year: Option<i32>,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl Title {
    /// Creates a title with a generated id and no optional metadata.
    pub fn new(
        code: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            title: title.into(),
            author: author.into(),
            publisher: None,
            publish_year: None,
            category: None,
            description: None,
        }
    }

    /// Checks required metadata before persistence.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_blank("code", &self.code)?;
        require_non_blank("title", &self.title)?;
        require_non_blank("author", &self.author)?;
        if let Some(year) = self.publish_year {
            if !(0..=9999).contains(&year) {
                return Err(ValidationError::OutOfRange {
                    field: "publish_year",
                    value: year.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Circulation status of a physical copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyStatus {
    /// On the shelf and loanable.
    Available,
    /// Referenced by an open line item.
    Borrowed,
    /// Removed from circulation after damage adjudication.
    Damaged,
    /// Removed from circulation after loss adjudication.
    Lost,
}

impl CopyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Borrowed => "borrowed",
            Self::Damaged => "damaged",
            Self::Lost => "lost",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "available" => Some(Self::Available),
            "borrowed" => Some(Self::Borrowed),
            "damaged" => Some(Self::Damaged),
            "lost" => Some(Self::Lost),
            _ => None,
        }
    }
}

/// Outcome of adjudicating a borrowed copy that will not come back to the shelf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjudicationOutcome {
    Damaged,
    Lost,
}

impl AdjudicationOutcome {
    /// Copy status the ledger records for this outcome.
    pub fn copy_status(self) -> CopyStatus {
        match self {
            Self::Damaged => CopyStatus::Damaged,
            Self::Lost => CopyStatus::Lost,
        }
    }

    /// Note segment appended to the adjudicated line item.
    pub fn note(self) -> &'static str {
        match self {
            Self::Damaged => "copy damaged",
            Self::Lost => "copy lost",
        }
    }
}

/// One physical, loanable instance of a title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Copy {
    pub id: CopyId,
    pub title_id: TitleId,
    /// Human label printed on the spine (copy number).
    pub label: String,
    /// Optional shelf location.
    pub location: Option<String>,
    pub status: CopyStatus,
}

impl Copy {
    /// Creates an available copy of `title_id`.
    pub fn new(title_id: TitleId, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title_id,
            label: label.into(),
            location: None,
            status: CopyStatus::Available,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_blank("label", &self.label)
    }

    /// Returns whether the copy can currently be lent out.
    pub fn is_available(&self) -> bool {
        self.status == CopyStatus::Available
    }
}

#[cfg(test)]
mod tests {
    use super::{AdjudicationOutcome, Copy, CopyStatus, Title};
    use crate::model::validation::ValidationError;
    use uuid::Uuid;

    #[test]
    fn copy_status_round_trips_through_storage_names() {
        for status in [
            CopyStatus::Available,
            CopyStatus::Borrowed,
            CopyStatus::Damaged,
            CopyStatus::Lost,
        ] {
            assert_eq!(CopyStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CopyStatus::parse("BORROWED"), None);
    }

    #[test]
    fn adjudication_maps_to_out_of_circulation_statuses() {
        assert_eq!(
            AdjudicationOutcome::Damaged.copy_status(),
            CopyStatus::Damaged
        );
        assert_eq!(AdjudicationOutcome::Lost.copy_status(), CopyStatus::Lost);
    }

    #[test]
    fn title_requires_code_and_rejects_silly_year() {
        let mut title = Title::new(" ", "Dune", "Frank Herbert");
        assert!(matches!(
            title.validate(),
            Err(ValidationError::Blank { field: "code" })
        ));

        title.code = "978-0441013593".to_string();
        title.publish_year = Some(12_000);
        assert!(matches!(
            title.validate(),
            Err(ValidationError::OutOfRange {
                field: "publish_year",
                ..
            })
        ));
    }

    #[test]
    fn new_copy_starts_available() {
        let copy = Copy::new(Uuid::new_v4(), "C-001");
        assert!(copy.is_available());
        assert!(copy.validate().is_ok());
    }
}

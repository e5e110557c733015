//! Typed failures surfaced by circulation services.
//!
//! # Invariants
//! - Every failure leaves persisted state as it was before the call; the
//!   owning service rolls its transaction back before returning the error.
//! - `code()` is stable and safe to log.

use crate::model::catalog::CopyId;
use crate::model::loan::LineItemId;
use crate::model::member::MemberId;
use crate::model::validation::ValidationError;
use crate::repo::{EntityKind, RepoError};
use rust_decimal::Decimal;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug)]
pub enum ServiceError {
    /// Referenced entity does not exist.
    NotFound { entity: EntityKind, id: Uuid },
    /// Status precondition violated.
    InvalidState(String),
    /// Requested copy is not on the shelf.
    CopyUnavailable(CopyId),
    /// Member would exceed the open-loan cap.
    CapacityExceeded {
        member_id: MemberId,
        active: u32,
        requested: u32,
        cap: u32,
    },
    /// Line item already has an actual return date.
    AlreadyReturned(LineItemId),
    /// Entity still has copies out on open line items.
    HasOpenCopies { entity: EntityKind, id: Uuid },
    /// Entity still carries unsettled fines.
    UnpaidFine {
        entity: EntityKind,
        id: Uuid,
        total: Decimal,
    },
    Validation(ValidationError),
    Repo(RepoError),
}

impl ServiceError {
    /// Stable machine-readable code for logs and callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::CopyUnavailable(_) => "copy_unavailable",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::AlreadyReturned(_) => "already_returned",
            Self::HasOpenCopies { .. } => "has_open_copies",
            Self::UnpaidFine { .. } => "unpaid_fine",
            Self::Validation(_) => "validation",
            Self::Repo(_) => "repo",
        }
    }

    pub(crate) fn not_found(entity: EntityKind, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::InvalidState(message) => write!(f, "invalid state: {message}"),
            Self::CopyUnavailable(id) => write!(f, "copy is not available: {id}"),
            Self::CapacityExceeded {
                member_id,
                active,
                requested,
                cap,
            } => write!(
                f,
                "member {member_id} has {active} open loans; {requested} more would exceed the cap of {cap}"
            ),
            Self::AlreadyReturned(id) => write!(f, "line item already returned: {id}"),
            Self::HasOpenCopies { entity, id } => {
                write!(f, "{entity} {id} still has borrowed copies")
            }
            Self::UnpaidFine { entity, id, total } => {
                write!(f, "{entity} {id} has unpaid fines: {total}")
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::from(RepoError::from(value))
    }
}

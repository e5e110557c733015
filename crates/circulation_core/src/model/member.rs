//! Library member model.
//!
//! # Responsibility
//! - Define member identity, contact data and membership validity window.
//! - Carry the denormalized open-loan counter maintained by the membership guard.
//!
//! # Invariants
//! - `0 <= active_borrow_count <= MAX_ACTIVE_LOANS`.
//! - `active_borrow_count` equals the number of open line items of the member.
//! - `expiry_date` is never earlier than `registration_date`.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::policy::MAX_ACTIVE_LOANS;
use super::validation::{require_email, require_non_blank, ValidationError};

pub type MemberId = Uuid;

/// Length of a membership when no explicit expiry is supplied.
pub const MEMBERSHIP_TERM_MONTHS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Active,
    Suspended,
    Expired,
}

impl MemberStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    /// Unique external member code printed on the card.
    pub code: String,
    pub full_name: String,
    /// Unique contact email.
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub status: MemberStatus,
    pub registration_date: NaiveDate,
    pub expiry_date: NaiveDate,
    /// Cached count of open line items. Only the membership guard writes it.
    pub active_borrow_count: u32,
}

impl Member {
    /// Creates an active member registered on `registration_date`.
    ///
    /// Expiry defaults to one year after registration.
    pub fn new(
        code: impl Into<String>,
        full_name: impl Into<String>,
        email: impl Into<String>,
        registration_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            full_name: full_name.into(),
            email: email.into(),
            phone: None,
            address: None,
            status: MemberStatus::Active,
            registration_date,
            expiry_date: default_expiry(registration_date),
            active_borrow_count: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_blank("code", &self.code)?;
        require_non_blank("full_name", &self.full_name)?;
        require_email(&self.email)?;
        if self.expiry_date < self.registration_date {
            return Err(ValidationError::OutOfRange {
                field: "expiry_date",
                value: self.expiry_date.to_string(),
            });
        }
        if self.active_borrow_count > MAX_ACTIVE_LOANS {
            return Err(ValidationError::OutOfRange {
                field: "active_borrow_count",
                value: self.active_borrow_count.to_string(),
            });
        }
        Ok(())
    }

    /// Returns whether the member may borrow on `today`.
    ///
    /// Requires `Active` status and an expiry date not in the past.
    pub fn can_borrow_on(&self, today: NaiveDate) -> bool {
        self.status == MemberStatus::Active && self.expiry_date >= today
    }
}

fn default_expiry(registration_date: NaiveDate) -> NaiveDate {
    registration_date
        .checked_add_months(Months::new(MEMBERSHIP_TERM_MONTHS))
        .unwrap_or(NaiveDate::MAX)
}

//! Lending policy constants and fine arithmetic.
//!
//! # Responsibility
//! - Hold the fixed circulation constants (loan cap, loan period).
//! - Hold the configurable fine amounts.
//! - Compute late days and late fines with exact decimal arithmetic.
//!
//! # Invariants
//! - Late day counts are never negative.
//! - Fine amounts are never negative.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Maximum number of simultaneously open line items per member.
pub const MAX_ACTIVE_LOANS: u32 = 3;

/// Default loan period when the caller does not supply a due date.
pub const LOAN_PERIOD_DAYS: u64 = 14;

/// Fine amounts applied by the loan manager and the overdue sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LendingPolicy {
    /// Charged per whole day past the due date.
    pub late_fee_per_day: Decimal,
    /// Fixed charge when a borrowed copy is adjudicated damaged.
    pub damaged_fine: Decimal,
    /// Fixed charge when a borrowed copy is adjudicated lost.
    pub lost_fine: Decimal,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            late_fee_per_day: Decimal::from(5_000),
            damaged_fine: Decimal::from(50_000),
            lost_fine: Decimal::from(100_000),
        }
    }
}

impl LendingPolicy {
    /// Rejects negative amounts.
    pub fn validate(&self) -> Result<(), super::validation::ValidationError> {
        for (field, amount) in [
            ("late_fee_per_day", self.late_fee_per_day),
            ("damaged_fine", self.damaged_fine),
            ("lost_fine", self.lost_fine),
        ] {
            if amount.is_sign_negative() {
                return Err(super::validation::ValidationError::OutOfRange {
                    field,
                    value: amount.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Late fine owed for a loan due on `due_date` evaluated on `on`.
    pub fn late_fine(&self, due_date: NaiveDate, on: NaiveDate) -> Decimal {
        self.late_fee_per_day * Decimal::from(days_late(due_date, on))
    }

    /// Fixed fine for an adjudication outcome.
    pub fn adjudication_fine(&self, outcome: super::catalog::AdjudicationOutcome) -> Decimal {
        match outcome {
            super::catalog::AdjudicationOutcome::Damaged => self.damaged_fine,
            super::catalog::AdjudicationOutcome::Lost => self.lost_fine,
        }
    }
}

/// Whole days between `due_date` and `on`, floored at zero.
pub fn days_late(due_date: NaiveDate, on: NaiveDate) -> i64 {
    (on - due_date).num_days().max(0)
}

/// Due date for a loan starting on `borrow_date` with the default period.
pub fn default_due_date(borrow_date: NaiveDate) -> NaiveDate {
    borrow_date
        .checked_add_days(Days::new(LOAN_PERIOD_DAYS))
        .unwrap_or(NaiveDate::MAX)
}

#[cfg(test)]
mod tests {
    use super::{days_late, default_due_date, LendingPolicy};
    use crate::model::catalog::AdjudicationOutcome;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn day(offset: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .checked_add_days(chrono::Days::new(offset))
            .unwrap()
    }

    #[test]
    fn late_days_never_go_negative() {
        assert_eq!(days_late(day(14), day(10)), 0);
        assert_eq!(days_late(day(14), day(14)), 0);
        assert_eq!(days_late(day(14), day(20)), 6);
    }

    #[test]
    fn returned_six_days_late_costs_thirty_thousand() {
        let policy = LendingPolicy::default();
        let due = default_due_date(day(0));
        assert_eq!(due, day(14));
        assert_eq!(policy.late_fine(due, day(20)), Decimal::from(30_000));
        assert_eq!(policy.late_fine(due, day(3)), Decimal::ZERO);
    }

    #[test]
    fn adjudication_fines_follow_outcome() {
        let policy = LendingPolicy::default();
        assert_eq!(
            policy.adjudication_fine(AdjudicationOutcome::Damaged),
            Decimal::from(50_000)
        );
        assert_eq!(
            policy.adjudication_fine(AdjudicationOutcome::Lost),
            Decimal::from(100_000)
        );
    }

    #[test]
    fn policy_deserializes_with_defaults_for_missing_fields() {
        let policy: LendingPolicy =
            serde_json::from_str(r#"{ "late_fee_per_day": "2500.50" }"#).unwrap();
        assert_eq!(policy.late_fee_per_day, Decimal::new(250_050, 2));
        assert_eq!(policy.lost_fine, Decimal::from(100_000));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let policy = LendingPolicy {
            damaged_fine: Decimal::from(-1),
            ..LendingPolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}

//! Circulation domain model.
//!
//! # Responsibility
//! - Define catalog, member and loan records used by core business logic.
//! - Hold lending policy constants and the calendar clock seam.
//!
//! # Invariants
//! - Records reference each other by id only; there are no embedded
//!   back-pointers between titles, copies, members and loans.
//! - All dates are calendar dates and all money is exact decimal.

pub mod catalog;
pub mod clock;
pub mod loan;
pub mod member;
pub mod policy;
pub mod validation;

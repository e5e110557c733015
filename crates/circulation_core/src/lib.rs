//! Core domain logic for library circulation.
//! This crate is the single source of truth for lending invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_logging, init_logging_with, logging_status, LogOptions};
pub use model::catalog::{AdjudicationOutcome, Copy, CopyId, CopyStatus, Title, TitleId};
pub use model::clock::{Clock, FixedClock, SystemClock};
pub use model::loan::{LineItem, LineItemId, LoanId, LoanRecord, LoanStatus, LoanTransaction};
pub use model::member::{Member, MemberId, MemberStatus};
pub use model::policy::{LendingPolicy, LOAN_PERIOD_DAYS, MAX_ACTIVE_LOANS};
pub use model::validation::ValidationError;
pub use repo::stats_repo::{
    circulation_report, financial_stats, flagged_members, never_borrowed_titles, overview_stats,
    top_borrowed_titles, CirculationReport, FinancialStats, FlaggedMember, OverviewStats,
    TitleUsage,
};
pub use repo::{EntityKind, Page, RepoError, RepoResult};
pub use service::catalog_service::CatalogService;
pub use service::error::{ServiceError, ServiceResult};
pub use service::fine_engine::{OverdueFineEngine, SweepFailure, SweepReport};
pub use service::loan_service::LoanService;
pub use service::member_service::MemberService;

/// Minimal health-check API for the CLI.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

//! Circulation command-line driver.
//!
//! # Responsibility
//! - Run the overdue sweep on demand (cron, manual catch-up).
//! - Audit and repair cached member borrow counters.
//! - Report circulation statistics and outstanding fines.
//! - Print machine-readable JSON summaries on stdout.

use chrono::NaiveDate;
use circulation_core::{
    circulation_report, default_log_level, init_logging_with, open_db, LendingPolicy,
    LoanService, LogOptions, OverdueFineEngine,
};
use clap::{Parser, Subcommand};
use log::info;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "circulation", version, about = "Library circulation maintenance")]
struct Cli {
    /// Absolute directory for rolling log files. Logging is off when omitted.
    #[arg(long, global = true)]
    log_dir: Option<String>,
    /// trace|debug|info|warn|error
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Checks that the core library is linked.
    Ping,
    /// Flags overdue loans and reprices running late fines.
    Sweep {
        #[arg(long)]
        db: PathBuf,
        /// Evaluation date (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
        /// JSON file with fine amounts; defaults apply to missing fields.
        #[arg(long)]
        policy: Option<PathBuf>,
    },
    /// Lists members whose borrow counter differs from their open loans.
    Audit {
        #[arg(long)]
        db: PathBuf,
        /// Rewrite drifted counters.
        #[arg(long)]
        repair: bool,
    },
    /// Prints counters, unpaid fines, flagged members and title usage.
    Stats {
        #[arg(long)]
        db: PathBuf,
        /// Number of most borrowed titles to list.
        #[arg(long, default_value_t = 10)]
        top: u32,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = setup_logging(&cli) {
        eprintln!("error: {err}");
        return ExitCode::from(2);
    }
    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(cli: &Cli) -> Result<(), String> {
    let Some(log_dir) = cli.log_dir.as_deref() else {
        return Ok(());
    };
    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    init_logging_with(LogOptions::parse(level, log_dir)?.with_stderr_echo(true))
}

fn run(command: Command) -> Result<ExitCode, Box<dyn Error>> {
    match command {
        Command::Ping => {
            println!("circulation_core ping={}", circulation_core::ping());
            println!("circulation_core version={}", circulation_core::core_version());
            Ok(ExitCode::SUCCESS)
        }
        Command::Sweep { db, date, policy } => {
            let policy = load_policy(policy.as_deref())?;
            let conn = open_db(&db)?;
            let engine = OverdueFineEngine::new(&conn, policy);
            let report = match date {
                Some(date) => engine.run_sweep(date)?,
                None => engine.run_sweep_today()?,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.is_clean() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(3))
            }
        }
        Command::Audit { db, repair } => {
            let conn = open_db(&db)?;
            let loans = LoanService::new(&conn, LendingPolicy::default());
            let entries = if repair {
                loans.repair_counters()?
            } else {
                loans.audit_counters()?
            };
            let rows: Vec<_> = entries
                .iter()
                .map(|entry| {
                    serde_json::json!({
                        "member_id": entry.member_id,
                        "stored": entry.stored,
                        "actual": entry.actual,
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "repaired": repair,
                    "mismatches": rows,
                }))?
            );
            info!(
                "event=cli_audit module=cli status=ok repair={repair} mismatches={}",
                entries.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Stats { db, top } => {
            let conn = open_db(&db)?;
            let report = circulation_report(&conn, top)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_policy(path: Option<&Path>) -> Result<LendingPolicy, Box<dyn Error>> {
    let policy = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|err| format!("failed to read policy `{}`: {err}", path.display()))?;
            serde_json::from_str::<LendingPolicy>(&raw)?
        }
        None => LendingPolicy::default(),
    };
    policy.validate()?;
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::Parser;

    #[test]
    fn sweep_parses_date_and_global_log_flags() {
        let cli = Cli::try_parse_from([
            "circulation",
            "sweep",
            "--db",
            "/tmp/library.db",
            "--date",
            "2024-03-05",
            "--log-level",
            "warn",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("warn"));
        match cli.command {
            Command::Sweep { date, policy, .. } => {
                assert_eq!(date.unwrap().to_string(), "2024-03-05");
                assert!(policy.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn stats_defaults_top_to_ten() {
        let cli = Cli::try_parse_from(["circulation", "stats", "--db", "/tmp/library.db"]).unwrap();
        match cli.command {
            Command::Stats { top, .. } => assert_eq!(top, 10),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn audit_requires_db() {
        assert!(Cli::try_parse_from(["circulation", "audit"]).is_err());
    }
}

//! Process-wide logging bootstrap.
//!
//! # Responsibility
//! - Start rolling file logs exactly once per process.
//! - Optionally echo warnings and errors to stderr for command-line runs.
//! - Capture panics as a single sanitized log line.
//!
//! # Invariants
//! - Events are metadata-only `key=value` lines; member names, emails and
//!   note text never reach the log.
//! - Repeating `init_logging` with identical options is a no-op; any other
//!   reconfiguration is rejected.
//! - Initialization never panics.

use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "circulation";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_LOG_FILES: usize = 5;
const PANIC_PAYLOAD_MAX_CHARS: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Validated logging options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub level: &'static str,
    pub log_dir: PathBuf,
    /// Mirror `warn` and above to stderr.
    pub echo_stderr: bool,
}

impl LogOptions {
    /// Normalizes a level name and checks the directory is absolute.
    pub fn parse(level: &str, log_dir: &str) -> Result<Self, String> {
        Ok(Self {
            level: normalize_level(level)?,
            log_dir: normalize_log_dir(log_dir)?,
            echo_stderr: false,
        })
    }

    pub fn with_stderr_echo(mut self, echo: bool) -> Self {
        self.echo_stderr = echo;
        self
    }
}

struct ActiveLogger {
    options: LogOptions,
    _handle: LoggerHandle,
}

/// Initializes file logging at `log_dir` with `level`.
///
/// # Errors
/// - Unsupported level, or an empty or relative directory.
/// - Logging already active with different options.
/// - Directory creation or backend start failure.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), String> {
    init_logging_with(LogOptions::parse(level, log_dir)?)
}

/// Initializes logging from pre-validated options.
pub fn init_logging_with(options: LogOptions) -> Result<(), String> {
    let active = ACTIVE.get_or_try_init(|| start_logger(options.clone()))?;
    if active.options != options {
        return Err(format!(
            "logging already initialized with level `{}` at `{}`; refusing to switch to level `{}` at `{}`",
            active.options.level,
            active.options.log_dir.display(),
            options.level,
            options.log_dir.display()
        ));
    }
    Ok(())
}

/// Active `(level, log_dir)`, or `None` before initialization.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    ACTIVE
        .get()
        .map(|active| (active.options.level, active.options.log_dir.clone()))
}

/// `debug` in debug builds, `info` in release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(options: LogOptions) -> Result<ActiveLogger, String> {
    std::fs::create_dir_all(&options.log_dir).map_err(|err| {
        format!(
            "failed to create log directory `{}`: {err}",
            options.log_dir.display()
        )
    })?;

    let duplicate = if options.echo_stderr {
        Duplicate::Warn
    } else {
        Duplicate::None
    };
    let handle = Logger::try_with_str(options.level)
        .map_err(|err| format!("invalid log level `{}`: {err}", options.level))?
        .log_to_file(
            FileSpec::default()
                .directory(options.log_dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEEP_LOG_FILES),
        )
        .duplicate_to_stderr(duplicate)
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        // [YYYY-MM-DD HH:MM:SS.ffffff TZ] LEVEL [module] file:line: message
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    install_panic_hook();
    info!(
        "event=logging_init module=logging status=ok version={} build_mode={} level={} log_dir={}",
        env!("CARGO_PKG_VERSION"),
        if cfg!(debug_assertions) { "debug" } else { "release" },
        options.level,
        options.log_dir.display()
    );

    Ok(ActiveLogger {
        options,
        _handle: handle,
    })
}

fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn normalize_log_dir(log_dir: &str) -> Result<PathBuf, String> {
    let trimmed = log_dir.trim();
    if trimmed.is_empty() {
        return Err("log_dir cannot be empty".to_string());
    }
    let path = Path::new(trimmed);
    if !path.is_absolute() {
        return Err(format!("log_dir must be an absolute path, got `{trimmed}`"));
    }
    Ok(path.to_path_buf())
}

fn install_panic_hook() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic_captured module=logging status=error location={} payload={}",
            location,
            single_line(&payload, PANIC_PAYLOAD_MAX_CHARS)
        );
        previous(panic_info);
    }));
}

/// Flattens to one line and caps at `max_chars`.
fn single_line(value: &str, max_chars: usize) -> String {
    let flat = value.replace(['\n', '\r'], " ");
    let mut capped: String = flat.chars().take(max_chars).collect();
    if flat.chars().count() > max_chars {
        capped.push_str("...");
    }
    capped
}

#[cfg(test)]
mod tests {
    use super::{init_logging, logging_status, single_line, LogOptions};
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(suffix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "circulation-logging-{suffix}-{}-{nanos}",
            std::process::id()
        ))
    }

    #[test]
    fn options_normalize_level_and_reject_relative_dir() {
        let options = LogOptions::parse(" WARNING ", "/var/log/circulation")
            .expect("absolute dir should parse");
        assert_eq!(options.level, "warn");
        assert!(!options.echo_stderr);

        let error = LogOptions::parse("info", "logs/dev").expect_err("relative dir must fail");
        assert!(error.contains("absolute"));
        let error = LogOptions::parse("loud", "/tmp").expect_err("unknown level must fail");
        assert!(error.contains("unsupported"));
    }

    #[test]
    fn single_line_flattens_and_caps() {
        let flat = single_line("line1\nline2\rline3", 8);
        assert!(!flat.contains('\n'));
        assert!(!flat.contains('\r'));
        assert!(flat.ends_with("..."));
    }

    #[test]
    fn init_is_idempotent_and_rejects_reconfiguration() {
        let dir = unique_temp_dir("idempotent");
        let dir_str = dir.to_str().expect("temp dir should be valid UTF-8").to_string();
        let other = unique_temp_dir("other");
        let other_str = other.to_str().expect("temp dir should be valid UTF-8").to_string();

        init_logging("info", &dir_str).expect("first init should succeed");
        init_logging("info", &dir_str).expect("same options should be a no-op");

        let err = init_logging("debug", &dir_str).expect_err("level change should fail");
        assert!(err.contains("refusing to switch"));
        let err = init_logging("info", &other_str).expect_err("dir change should fail");
        assert!(err.contains("refusing to switch"));

        let (level, active_dir) = logging_status().expect("logging should be active");
        assert_eq!(level, "info");
        assert_eq!(active_dir, dir);
    }
}

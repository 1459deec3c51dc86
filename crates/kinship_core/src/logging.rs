//! Process-wide file logging for registry passes and services.
//!
//! Core code only uses the `log` facade; this module wires it to rolling
//! files once per process. Events keep the
//! `event=<name> module=<module> status=<ok|error|skip|partial>` shape so a
//! reconciliation run can be audited with `grep`.
//!
//! # Invariants
//! - The first successful call fixes level and directory for the process;
//!   a repeat with the same settings is a no-op, anything else is rejected.
//! - Warnings and errors are mirrored to stderr.

use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "kinship";
const ROTATE_AFTER_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_LOG_FILES: usize = 5;
const PANIC_PAYLOAD_LIMIT: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Validated logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSettings {
    level: &'static str,
    dir: PathBuf,
}

struct ActiveLogger {
    settings: LogSettings,
    handle: LoggerHandle,
}

/// Logging bootstrap failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    UnsupportedLevel(String),
    InvalidDirectory(String),
    AlreadyInitialized { active: String, requested: String },
    Backend(String),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::InvalidDirectory(message) => write!(f, "invalid log directory: {message}"),
            Self::AlreadyInitialized { active, requested } => write!(
                f,
                "logging already initialized as {active}; cannot switch to {requested}"
            ),
            Self::Backend(message) => write!(f, "failed to start logger: {message}"),
        }
    }
}

impl Error for LoggingError {}

impl LogSettings {
    fn parse(level: &str, dir: &str) -> Result<Self, LoggingError> {
        let level = match level.trim().to_ascii_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" | "warning" => "warn",
            "error" => "error",
            other => return Err(LoggingError::UnsupportedLevel(other.to_string())),
        };

        let dir = dir.trim();
        if dir.is_empty() {
            return Err(LoggingError::InvalidDirectory("path is empty".to_string()));
        }
        let dir = Path::new(dir);
        if !dir.is_absolute() {
            return Err(LoggingError::InvalidDirectory(format!(
                "`{}` is not absolute",
                dir.display()
            )));
        }
        Ok(Self {
            level,
            dir: dir.to_path_buf(),
        })
    }

    fn describe(&self) -> String {
        format!("level={} dir={}", self.level, self.dir.display())
    }
}

/// Starts rolling file logs under `log_dir` at `level`.
///
/// # Errors
/// - `UnsupportedLevel` / `InvalidDirectory` for bad arguments.
/// - `AlreadyInitialized` when a different configuration is active.
/// - `Backend` when the directory or logger cannot be set up.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), LoggingError> {
    let requested = LogSettings::parse(level, log_dir)?;
    let active = ACTIVE.get_or_try_init(|| start_logger(&requested))?;
    if active.settings != requested {
        return Err(LoggingError::AlreadyInitialized {
            active: active.settings.describe(),
            requested: requested.describe(),
        });
    }
    Ok(())
}

/// `debug` for debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(settings: &LogSettings) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(&settings.dir).map_err(|err| {
        LoggingError::Backend(format!("cannot create `{}`: {err}", settings.dir.display()))
    })?;

    let handle = Logger::try_with_str(settings.level)
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .log_to_file(
            FileSpec::default()
                .directory(settings.dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AFTER_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEEP_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .duplicate_to_stderr(Duplicate::Warn)
        .format_for_files(flexi_logger::detailed_format)
        .format_for_stderr(flexi_logger::default_format)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    install_panic_hook();
    info!(
        "event=core_init module=logging status=ok version={} {}",
        env!("CARGO_PKG_VERSION"),
        settings.describe()
    );

    Ok(ActiveLogger {
        settings: settings.clone(),
        handle,
    })
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
            single_line(&payload, PANIC_PAYLOAD_LIMIT)
        );
        previous(panic_info);
    }));
}

/// Payloads may carry member names; keep them on one bounded line.
fn single_line(value: &str, limit: usize) -> String {
    let flattened = value.replace(['\n', '\r'], " ");
    let mut line = flattened.chars().take(limit).collect::<String>();
    if flattened.chars().count() > limit {
        line.push_str("...");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::{init_logging, single_line, LogSettings, LoggingError, ACTIVE};
    use crate::db::open_db_in_memory;
    use crate::model::member::{Gender, Member};
    use crate::repo::marriage_repo::SqliteMarriageRepository;
    use crate::repo::member_repo::{MemberRepository, SqliteMemberRepository};
    use crate::service::backfill_service::MarriageBackfill;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn settings_normalize_level_and_require_absolute_dir() {
        let settings = LogSettings::parse(" Warning ", "/var/log/kinship").unwrap();
        assert_eq!(settings.level, "warn");

        assert_eq!(
            LogSettings::parse("verbose", "/tmp").unwrap_err(),
            LoggingError::UnsupportedLevel("verbose".to_string())
        );
        assert!(matches!(
            LogSettings::parse("info", "logs/registry").unwrap_err(),
            LoggingError::InvalidDirectory(_)
        ));
        assert!(matches!(
            LogSettings::parse("info", "  ").unwrap_err(),
            LoggingError::InvalidDirectory(_)
        ));
    }

    #[test]
    fn panic_payload_is_flattened_and_capped() {
        assert_eq!(single_line("Asha\nPatel", 20), "Asha Patel");
        assert_eq!(single_line("abcdefghij", 4), "abcd...");
    }

    #[test]
    fn pass_events_land_in_the_log_file_and_conflicts_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap().to_string();
        let other = tempfile::tempdir().unwrap();

        init_logging("info", &dir_str).unwrap();
        init_logging("INFO", &dir_str).unwrap();
        assert!(matches!(
            init_logging("debug", &dir_str).unwrap_err(),
            LoggingError::AlreadyInitialized { .. }
        ));
        assert!(matches!(
            init_logging("info", other.path().to_str().unwrap()).unwrap_err(),
            LoggingError::AlreadyInitialized { .. }
        ));

        let conn = open_db_in_memory().unwrap();
        let members = SqliteMemberRepository::try_new(&conn).unwrap();
        let husband = members
            .create_member(&Member::new("Kiran", None, Gender::Male))
            .unwrap();
        let mut wife = Member::new("Leela", None, Gender::Female);
        wife.spouse_id = Some(husband);
        members.create_member(&wife).unwrap();
        MarriageBackfill::new(members, SqliteMarriageRepository::try_new(&conn).unwrap())
            .run(&AtomicBool::new(false))
            .unwrap();

        ACTIVE.get().unwrap().handle.flush();
        let written = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .map(|entry| std::fs::read_to_string(entry.path()).unwrap_or_default())
            .collect::<String>();
        assert!(written.contains("event=core_init module=logging status=ok"));
        assert!(written.contains("event=marriage_backfill"));
    }
}

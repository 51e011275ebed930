//! # Logging Utilities
//!
//! Logging setup for the livecov tools, built on `tracing`.
//!
//! Console output goes to stderr. Commands print coverage reports on stdout
//! and the two streams must not mix.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use livecov_utils::init_logging;
//!
//! // Keep the guard alive for as long as logs should reach the file
//! let _guard = init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("collector started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Log level filter (e.g., `RUST_LOG=debug`, `RUST_LOG=livecov_core=trace`)
//! - `LIVECOV_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
//! - `LIVECOV_LOG_FILE`: Optional path of a daily-rolled log file written next to the console
//!
//! ## Examples
//!
//! ```rust,no_run
//! use livecov_utils::{init_logging_with_level, LogFormat, LogLevel};
//!
//! let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Json)
//!     .expect("Failed to initialize logging");
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fs, io};

use chrono::{NaiveDate, Utc};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

pub const LOG_FORMAT_VAR: &str = "LIVECOV_LOG_FORMAT";
pub const LOG_FILE_VAR: &str = "LIVECOV_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat
{
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(format!("{s}. Use 'pretty' or 'json'"))),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(format!(
                "{s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            ))),
        }
    }
}

/// Keeps the background log writer running.
///
/// Buffered file output is flushed when the guard is dropped.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct LoggingGuard
{
    _worker: Option<WorkerGuard>,
}

/// Initialize console logging configured from the environment.
///
/// Unknown values of `LIVECOV_LOG_FORMAT` fall back to `pretty`.
///
/// ## Errors
///
/// - `InitializationFailed`: a global subscriber is already installed
/// - `FileError`: the directory of `LIVECOV_LOG_FILE` could not be created
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    let format = env::var(LOG_FORMAT_VAR)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    init_console(format, None)
}

/// Initialize console logging with an explicit level and format.
///
/// The level wins over `RUST_LOG`.
///
/// ## Errors
///
/// Same as [`init_logging`].
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    init_console(format, Some(level.into()))
}

/// Initialize file-only logging.
///
/// Logs go to `~/.livecov/YYYY-MM-DD-livecov.log`, or the same name in the
/// system temp directory when there is no home directory. Used when the
/// process under measurement owns both stdout and stderr.
///
/// ## Errors
///
/// - `FileError`: the log directory could not be created
/// - `InitializationFailed`: a global subscriber is already installed
pub fn init_logging_to_file(level: Option<LogLevel>) -> Result<(PathBuf, LoggingGuard), LoggingError>
{
    let home = env::var_os("HOME").map(PathBuf::from);
    let log_file = log_file_path(home.as_deref(), Utc::now().date_naive());
    if let Some(dir) = log_file.parent() {
        fs::create_dir_all(dir)?;
    }

    let appender = tracing_appender::rolling::never(parent_or_cwd(&log_file), file_name(&log_file));
    let (writer, worker) = tracing_appender::non_blocking(appender);
    let layer = layer(LogFormat::Pretty, writer, false, filter(level.map(Into::into)));
    install(vec![layer])?;

    Ok((log_file, LoggingGuard { _worker: Some(worker) }))
}

/// Dated log file inside `home/.livecov`, or the temp directory without a home.
pub fn log_file_path(home: Option<&Path>, date: NaiveDate) -> PathBuf
{
    let name = format!("{}-livecov.log", date.format("%Y-%m-%d"));
    match home {
        Some(home) => home.join(".livecov").join(name),
        None => env::temp_dir().join(name),
    }
}

fn init_console(format: LogFormat, explicit_level: Option<Level>) -> Result<LoggingGuard, LoggingError>
{
    let mut layers = vec![layer(format, io::stderr, true, filter(explicit_level))];
    let mut worker = None;

    if let Some(log_file) = env::var_os(LOG_FILE_VAR).map(PathBuf::from) {
        if let Some(dir) = log_file.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let appender = tracing_appender::rolling::daily(parent_or_cwd(&log_file), file_name(&log_file));
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(layer(format, writer, false, filter(explicit_level)));
        worker = Some(guard);
    }

    install(layers)?;
    Ok(LoggingGuard { _worker: worker })
}

fn install(layers: Vec<BoxedLayer>) -> Result<(), LoggingError>
{
    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))
}

/// Explicit level, then `RUST_LOG`, then `info`.
fn filter(explicit_level: Option<Level>) -> EnvFilter
{
    match explicit_level {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
    }
}

fn layer<W>(format: LogFormat, writer: W, ansi: bool, filter: EnvFilter) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339());

    match format {
        LogFormat::Pretty => base.with_ansi(ansi).with_filter(filter).boxed(),
        LogFormat::Json => base
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

fn parent_or_cwd(path: &Path) -> PathBuf
{
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn file_name(path: &Path) -> PathBuf
{
    path.file_name().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("livecov.log"))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// A global subscriber was already set
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("text").unwrap(), LogFormat::Pretty);
        assert!(matches!(LogFormat::from_str("xml"), Err(LoggingError::InvalidFormat(_))));
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("error").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("dbg").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert!(matches!(LogLevel::from_str("loud"), Err(LoggingError::InvalidLevel(_))));
    }

    #[test]
    fn test_log_level_to_tracing_level()
    {
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_log_file_path()
    {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(
            log_file_path(Some(Path::new("/home/dev")), date),
            PathBuf::from("/home/dev/.livecov/2026-03-07-livecov.log")
        );
        assert_eq!(log_file_path(None, date), env::temp_dir().join("2026-03-07-livecov.log"));
    }

    #[test]
    fn test_file_name_helpers()
    {
        assert_eq!(parent_or_cwd(Path::new("app.log")), PathBuf::from("."));
        assert_eq!(parent_or_cwd(Path::new("/var/log/app.log")), PathBuf::from("/var/log"));
        assert_eq!(file_name(Path::new("/var/log/app.log")), PathBuf::from("app.log"));
        assert_eq!(file_name(Path::new("/")), PathBuf::from("livecov.log"));
    }
}

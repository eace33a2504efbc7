//! # Logging Utilities
//!
//! `tracing` setup shared by the rbscope binaries.
//!
//! Logs always go to stderr so that traces printed on stdout can be piped
//! cleanly. An optional log file receives the same events without colors.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: filter directives (e.g. `RUST_LOG=rbscope_core=trace`)
//! - `RBSCOPE_LOG_FORMAT`: `pretty` (default) or `json`
//! - `RBSCOPE_LOG_FILE`: also log to this file; a directory gets a dated
//!   `YYYY-MM-DD-rbscope.log` inside it
//!
//! ## Example
//!
//! ```rust,no_run
//! use rbscope_utils::{LogFormat, LogLevel, init_logging_with_level};
//!
//! let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Pretty).expect("Failed to initialize logging");
//! tracing::debug!("walking frames");
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::{Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

pub const LOG_FORMAT_ENV: &str = "RBSCOPE_LOG_FORMAT";
pub const LOG_FILE_ENV: &str = "RBSCOPE_LOG_FILE";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable, colored on terminals
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
            _ => Err(LoggingError::InvalidFormat(format!("{s} (use 'pretty' or 'json')"))),
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
                "{s} (use 'error', 'warn', 'info', 'debug', or 'trace')"
            ))),
        }
    }
}

/// Everything the subscriber setup needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig
{
    /// Explicit level; overrides `RUST_LOG` when set.
    pub level: Option<LogLevel>,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl LoggingConfig
{
    /// Read `RBSCOPE_LOG_FORMAT` and `RBSCOPE_LOG_FILE`.
    ///
    /// An unknown format falls back to pretty output.
    pub fn from_env() -> Self
    {
        let format = env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|s| LogFormat::from_str(&s).ok())
            .unwrap_or_default();
        let file = env::var_os(LOG_FILE_ENV).filter(|path| !path.is_empty()).map(PathBuf::from);
        Self {
            level: None,
            format,
            file,
        }
    }

    /// Filter priority: explicit level, then `RUST_LOG`, then `warn`.
    fn filter(&self) -> EnvFilter
    {
        if let Some(level) = self.level {
            return EnvFilter::new(Level::from(level).to_string());
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::WARN.to_string()))
    }
}

/// Keeps the file writer flushing; drop it at the end of `main`.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct LoggingGuard
{
    _file: Option<WorkerGuard>,
}

/// Initialize logging from the environment only.
///
/// ## Errors
///
/// Returns an error if logging is already initialized or the log file cannot
/// be created.
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    init_logging_with(LoggingConfig::from_env())
}

/// Initialize logging with an explicit level and format; the log file still
/// comes from `RBSCOPE_LOG_FILE`.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    init_logging_with(LoggingConfig {
        level: Some(level),
        format,
        ..LoggingConfig::from_env()
    })
}

/// Initialize logging from a fully specified config.
pub fn init_logging_with(config: LoggingConfig) -> Result<LoggingGuard, LoggingError>
{
    let console = event_layer::<Registry>(config.format, true)
        .with_writer(io::stderr)
        .with_filter(config.filter())
        .boxed();

    let mut guard = LoggingGuard::default();
    let mut layers = vec![console];
    if let Some(path) = &config.file {
        let path = resolve_log_path(path);
        let directory = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        std::fs::create_dir_all(&directory)?;
        let file_name = path.file_name().unwrap_or_default();
        let appender = tracing_appender::rolling::never(&directory, file_name);
        let (writer, worker) = tracing_appender::non_blocking(appender);
        guard._file = Some(worker);
        layers.push(
            event_layer::<Registry>(config.format, false)
                .with_writer(writer)
                .with_filter(config.filter())
                .boxed(),
        );
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;
    Ok(guard)
}

/// A formatting layer without a writer, in the requested format.
fn event_layer<S>(format: LogFormat, ansi: bool) -> EventLayer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span> + 'static,
{
    let base = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339());
    match format {
        LogFormat::Pretty => EventLayer::Pretty(base.with_ansi(ansi)),
        LogFormat::Json => EventLayer::Json(base.json().with_current_span(true).with_span_list(true)),
    }
}

type PrettyLayer<S> = fmt::Layer<S, fmt::format::DefaultFields, fmt::format::Format<fmt::format::Full, ChronoUtc>>;
type JsonLayer<S> = fmt::Layer<S, fmt::format::JsonFields, fmt::format::Format<fmt::format::Json, ChronoUtc>>;

/// Either formatting layer, so writers and filters are attached once.
enum EventLayer<S>
{
    Pretty(PrettyLayer<S>),
    Json(JsonLayer<S>),
}

impl<S> EventLayer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span> + 'static,
{
    fn with_writer<W>(self, writer: W) -> Box<dyn Layer<S> + Send + Sync>
    where
        W: for<'writer> fmt::MakeWriter<'writer> + Send + Sync + 'static,
    {
        match self {
            EventLayer::Pretty(layer) => layer.with_writer(writer).boxed(),
            EventLayer::Json(layer) => layer.with_writer(writer).boxed(),
        }
    }
}

/// A directory (existing, or spelled with a trailing slash) gets a dated file.
fn resolve_log_path(path: &Path) -> PathBuf
{
    let names_directory = path.is_dir() || path.as_os_str().to_string_lossy().ends_with('/');
    if names_directory {
        let today = Utc::now().format("%Y-%m-%d");
        path.join(format!("{today}-rbscope.log"))
    } else {
        path.to_path_buf()
    }
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// A global subscriber is already installed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

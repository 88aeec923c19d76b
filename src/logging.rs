//! Logging configuration and initialization
//!
//! Centralized setup for the `tracing` ecosystem, configurable through
//! environment variables:
//!
//! - `RUST_LOG`: standard tracing filter (e.g. "info", "debug,hipmux=trace")
//! - `HIPMUX_LOG_LEVEL`: simple log level (error, warn, info, debug, trace)
//! - `HIPMUX_LOG_FORMAT`: output format ("human" or "json")

use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TRACING_INITIALIZED: OnceCell<()> = OnceCell::new();

const LOG_LEVEL_ENV: &str = "HIPMUX_LOG_LEVEL";
const LOG_FORMAT_ENV: &str = "HIPMUX_LOG_FORMAT";

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Log format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable console output (default)
    #[default]
    Human,
    /// JSON structured output
    Json,
}

impl LogFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" | "pretty" | "console" => Some(LogFormat::Human),
            "json" | "structured" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Initialize logging from environment variables.
///
/// Idempotent: calling it multiple times only installs a subscriber once.
pub fn init_logging_from_env() {
    TRACING_INITIALIZED.get_or_init(|| {
        let level = std::env::var(LOG_LEVEL_ENV)
            .ok()
            .and_then(|s| LogLevel::from_str(&s))
            .unwrap_or_default();
        let format = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|s| LogFormat::from_str(&s))
            .unwrap_or_default();
        init_internal(level, format);
    });
}

fn init_internal(level: LogLevel, format: LogFormat) {
    // RUST_LOG wins when set; the simple level variable is the fallback.
    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_filter_str()));

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true))
            .try_init(),
        LogFormat::Human => registry.with(fmt::layer().with_target(true)).try_init(),
    };
    // Another subscriber may already be installed (tests, embedding app);
    // that is not our problem to fix.
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed, leaving it in place");
    }
}

/// Check if this crate installed its subscriber
pub fn is_initialized() -> bool {
    TRACING_INITIALIZED.get().is_some()
}

//! Tracing configuration for the vaultplate CLI
//!
//! Everything goes to stderr so stdout carries only rendered manifests.

use std::io;
pub use tracing::Level;
use tracing_subscriber::{
    Layer, Registry, filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};
use uuid::Uuid;

/// Crates whose events are shown at the requested level
const CRATES: &[&str] = &[
    "vaultplate",
    "vaultplate_core",
    "vaultplate_secrets",
    "vaultplate_vault",
    "vaultplate_aws",
];

/// Tracing output format options
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum TracingFormat {
    /// Pretty-printed human-readable format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
    /// Structured JSON format
    Json,
    /// Development format with extra context
    Dev,
}

/// Log level options for CLI
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum LogLevel {
    /// Show all logs (trace level)
    Trace,
    /// Show debug and above
    Debug,
    /// Show info and above
    Info,
    /// Show warnings and above (default)
    #[default]
    Warn,
    /// Show errors only
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Global correlation ID for one invocation
static CORRELATION_ID: std::sync::OnceLock<Uuid> = std::sync::OnceLock::new();

/// Get or create the correlation ID of this run
pub fn correlation_id() -> Uuid {
    *CORRELATION_ID.get_or_init(Uuid::new_v4)
}

/// Filter directive enabling `level` for every vaultplate crate
fn default_directive(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber writing `format` to stderr
///
/// `RUST_LOG` wins over `level` when set.
///
/// # Errors
///
/// Returns an error if the filter directive is invalid.
pub fn init_tracing(format: TracingFormat, level: Level) -> miette::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(level)))
        .map_err(|e| miette::miette!("Failed to create tracing filter: {e}"))?;

    let output = fmt::layer().with_writer(io::stderr);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        TracingFormat::Pretty => output.pretty().boxed(),
        TracingFormat::Compact => output.compact().with_target(false).boxed(),
        TracingFormat::Json => output
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        TracingFormat::Dev => output
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .boxed(),
    };
    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter)
        .init();

    tracing::info!(
        correlation_id = %correlation_id(),
        version = env!("CARGO_PKG_VERSION"),
        ?format,
        "Tracing initialized"
    );
    Ok(())
}

/// Create a span for command execution carrying the correlation id
#[macro_export]
macro_rules! command_span {
    ($command:expr) => {
        tracing::info_span!(
            "command",
            command = %$command,
            correlation_id = %$crate::tracing::correlation_id(),
        )
    };
}

//! Command-line surface: argument parsing, error types and exit codes

use crate::tracing::{LogLevel, TracingFormat};
use clap::{Parser, Subcommand};
use miette::{Diagnostic, Report};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;
use vaultplate_secrets::AuthError;

/// Every document rendered
pub const EXIT_OK: i32 = 0;
/// At least one document failed to resolve
pub const EXIT_FAILURE: i32 = 1;
/// Invalid invocation or configuration
pub const EXIT_CONFIG: i32 = 2;
/// No backend session could be established
pub const EXIT_AUTH: i32 = 3;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// Configuration or input error (exit code 2)
    #[error("Configuration error: {message}")]
    #[diagnostic(code(vaultplate::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Authentication against the backend failed (exit code 3)
    #[error("Authentication failed: {message}")]
    #[diagnostic(code(vaultplate::cli::auth))]
    Auth {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Some documents could not be resolved (exit code 1)
    #[error("{failed} of {total} document(s) could not be resolved")]
    #[diagnostic(code(vaultplate::cli::failed))]
    Failed {
        /// Number of failed documents
        failed: usize,
        /// Number of documents processed
        total: usize,
    },
    /// Other unexpected error (exit code 1)
    #[error("Unexpected error: {message}")]
    #[diagnostic(code(vaultplate::cli::other))]
    Other {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new other error
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: None,
        }
    }
}

impl From<AuthError> for CliError {
    fn from(err: AuthError) -> Self {
        let help = match &err {
            AuthError::MissingCredentials { .. } => {
                "Check the credential settings for the selected backend"
            }
            AuthError::Rejected { .. } => "Verify the credentials are valid and not expired",
        };
        Self::Auth {
            message: err.to_string(),
            help: Some(help.to_string()),
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CONFIG,
        CliError::Auth { .. } => EXIT_AUTH,
        CliError::Failed { .. } | CliError::Other { .. } => EXIT_FAILURE,
    }
}

/// Print an error to stderr through miette
pub fn render_error(err: &CliError) {
    let report = Report::new(err.clone());
    eprintln!("{report:?}");
    // Ensure output is flushed before potential process exit
    let _ = io::stderr().flush();
}

/// Render Kubernetes manifests by substituting secret placeholders.
#[derive(Parser, Debug)]
#[command(name = "vaultplate")]
#[command(about = "Render Kubernetes manifests by substituting secret placeholders")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    /// Log output format.
    #[arg(
        long = "log-format",
        global = true,
        help = "Log output format",
        default_value = "compact",
        value_enum
    )]
    pub log_format: TracingFormat,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve placeholders in manifests and print the result.
    #[command(about = "Resolve placeholders in a manifest file or directory")]
    Generate {
        /// Manifest file or directory of `*.yaml`/`*.yml` files
        path: PathBuf,

        /// Settings file (YAML, JSON or KEY=VALUE lines) overriding the environment
        #[arg(short = 'c', long = "config-path")]
        config_path: Option<PathBuf>,
    },
    /// Show version information.
    #[command(about = "Show version information")]
    Version,
}

/// Parse the process arguments
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

//! Subcommand implementations

pub mod generate;
pub mod version;

use crate::cli::{CliError, Commands};
use crate::command_span;
use std::io::Write;
use tracing::Instrument;

/// Run one parsed subcommand
///
/// # Errors
///
/// Returns the [`CliError`] that determines the process exit code.
pub async fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Generate { path, config_path } => {
            generate::execute(&path, config_path.as_deref())
                .instrument(command_span!("generate"))
                .await
        }
        Commands::Version => {
            let info = version::get_version_info();
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{info}")
                .map_err(|e| CliError::other(format!("Cannot write to stdout: {e}")))
        }
    }
}

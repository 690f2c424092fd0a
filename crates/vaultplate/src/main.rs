//! vaultplate binary

// CLI binary needs to output to stderr - this is intentional
#![allow(clippy::print_stderr)]

use vaultplate::cli::{self, CliError, EXIT_OK, exit_code_for, render_error};
use vaultplate::commands;
use vaultplate::tracing::init_tracing;

fn main() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("Application panicked: {info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    if let Err(err) = init_tracing(cli.log_format, cli.level.into()) {
        eprintln!("{err:?}");
    }

    let exit_code = match run(cli) {
        Ok(()) => EXIT_OK,
        Err(err) => {
            render_error(&err);
            exit_code_for(&err)
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: cli::Cli) -> Result<(), CliError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::other(format!("Failed to start async runtime: {e}")))?;
    runtime.block_on(commands::run(cli.command))
}

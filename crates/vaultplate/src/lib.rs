// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

//! vaultplate command-line interface
//!
//! Reads Kubernetes manifests, replaces `<key>` placeholders with values from
//! the configured secret backend and prints the rendered documents.
//!
//! The library half exposes the pieces the binary wires together so they can
//! be tested without spawning a process:
//!
//! - [`cli`] - argument parsing, [`cli::CliError`] and exit codes
//! - [`config`] - settings from the environment and `--config-path`
//! - [`manifests`] - reading and writing multi-document YAML
//! - [`session_store`] - persisted backend sessions
//! - [`commands`] - subcommand implementations

// The CLI reports errors on stderr by design
#![allow(clippy::print_stderr)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod manifests;
pub mod session_store;
pub mod tracing;

//! Built-in secret backends
//!
//! These require no external services:
//!
//! - [`EnvBackend`] - JSON objects stored in environment variables
//! - [`FileBackend`] - static source map loaded from a YAML/JSON file
//!
//! Product backends are available via separate crates:
//!
//! - `vault` - HashiCorp Vault KV (vaultplate-vault crate)
//! - `awssecretsmanager` - AWS Secrets Manager (vaultplate-aws crate)

mod env;
mod file;

pub use env::EnvBackend;
pub use file::FileBackend;

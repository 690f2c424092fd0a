//! `HashiCorp` Vault backend for vaultplate
//!
//! Reads whole KV (v1 or v2) secrets and exposes them as
//! [`SecretData`](vaultplate_secrets::SecretData). Supports token, AppRole,
//! Kubernetes and userpass authentication.

pub mod config;
pub mod secrets;

// Re-export main types for convenience
pub use config::{KvVersion, VaultAuth, VaultConfig};
pub use secrets::VaultBackend;

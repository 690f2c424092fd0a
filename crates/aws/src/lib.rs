//! AWS Secrets Manager backend for vaultplate
//!
//! A source path is a secret id (name or ARN) whose secret string holds a JSON
//! object; every top-level field of that object becomes a placeholder key.

pub mod secrets;

// Re-export main types for convenience
pub use secrets::{AwsSecretsManagerBackend, SecretRef};

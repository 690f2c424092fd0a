//! Vault connection and authentication settings

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default location of the projected service account token
pub const DEFAULT_K8S_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// KV secrets engine version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KvVersion {
    /// Unversioned KV engine
    V1,
    /// Versioned KV engine (`<mount>/data/<path>`)
    #[default]
    V2,
}

impl FromStr for KvVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(Self::V1),
            "2" => Ok(Self::V2),
            other => Err(format!("unsupported KV version '{other}', expected 1 or 2")),
        }
    }
}

impl fmt::Display for KvVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 => write!(f, "1"),
            Self::V2 => write!(f, "2"),
        }
    }
}

/// How to obtain a Vault token
#[derive(Clone, Default)]
pub enum VaultAuth {
    /// Use the token from [`VaultConfig::token`] as is
    #[default]
    Token,
    /// AppRole login
    AppRole {
        /// Role ID
        role_id: String,
        /// Secret ID
        secret_id: SecretString,
    },
    /// Kubernetes service account login
    Kubernetes {
        /// Vault role bound to the service account
        role: String,
        /// File holding the service account JWT
        token_path: PathBuf,
    },
    /// Username and password login
    UserPass {
        /// Username
        username: String,
        /// Password
        password: SecretString,
    },
}

impl VaultAuth {
    /// Name of the auth method, as used in configuration
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::AppRole { .. } => "approle",
            Self::Kubernetes { .. } => "k8s",
            Self::UserPass { .. } => "userpass",
        }
    }

    /// Mount path Vault enables this method at by default
    #[must_use]
    pub const fn default_mount(&self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::AppRole { .. } => "approle",
            Self::Kubernetes { .. } => "kubernetes",
            Self::UserPass { .. } => "userpass",
        }
    }
}

impl fmt::Debug for VaultAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token => f.write_str("Token"),
            Self::AppRole { role_id, .. } => f
                .debug_struct("AppRole")
                .field("role_id", role_id)
                .field("secret_id", &"[REDACTED]")
                .finish(),
            Self::Kubernetes { role, token_path } => f
                .debug_struct("Kubernetes")
                .field("role", role)
                .field("token_path", token_path)
                .finish(),
            Self::UserPass { username, .. } => f
                .debug_struct("UserPass")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Settings for [`VaultBackend`](crate::VaultBackend)
///
/// With an `address` the backend talks HTTP; without one it shells out to the
/// `vault` CLI, which reads its own environment and token helper.
#[derive(Clone, Default)]
pub struct VaultConfig {
    /// Server address, e.g. `https://vault.example.com:8200`
    pub address: Option<String>,
    /// Pre-issued token for [`VaultAuth::Token`]
    pub token: Option<SecretString>,
    /// Auth method
    pub auth: VaultAuth,
    /// Mount path of the auth method (defaults per method)
    pub auth_mount: Option<String>,
    /// KV engine version of the secret mounts
    pub kv_version: KvVersion,
}

impl VaultConfig {
    /// Token auth against `address`
    #[must_use]
    pub fn with_token(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            token: Some(SecretString::from(token.into())),
            ..Self::default()
        }
    }

    /// Effective auth mount path
    #[must_use]
    pub fn auth_mount(&self) -> &str {
        self.auth_mount
            .as_deref()
            .map(|m| m.trim_matches('/'))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.auth.default_mount())
    }

    /// Whether requests go over HTTP (as opposed to the CLI)
    #[must_use]
    pub const fn uses_http(&self) -> bool {
        self.address.is_some()
    }

    pub(crate) fn token_str(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.expose_secret())
    }
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("auth", &self.auth)
            .field("auth_mount", &self.auth_mount())
            .field("kv_version", &self.kv_version)
            .finish()
    }
}

//! Secret backends for vaultplate
//!
//! Provides a unified interface over secret stores (HashiCorp Vault, AWS
//! Secrets Manager, local files, environment variables). A backend turns a
//! *source path* into a flat [`SecretData`] map of field name to value.
//!
//! # Sessions
//!
//! Backends that issue tokens hand out an explicit [`Session`]. Callers check
//! an existing session with [`BackendClient::validate_session`] and only log in
//! again when it is missing or expired; [`establish_session`] does exactly that.
//!
//! # Caching
//!
//! [`SecretCache`] memoizes fetches per source path for the lifetime of one run:
//!
//! ```ignore
//! use vaultplate_secrets::{SecretCache, establish_session};
//!
//! let session = establish_session(backend.as_ref(), stored_session).await?;
//! let cache = SecretCache::new(backend, session);
//!
//! // Both calls hit the backend once
//! let a = cache.get_or_fetch("secret/data/app").await?;
//! let b = cache.get_or_fetch("secret/data/app").await?;
//! ```

mod cache;
mod session;
mod types;

pub mod backends;

pub use cache::{CacheConfig, DEFAULT_FETCH_TIMEOUT, SecretCache};
pub use session::Session;
pub use types::{KeyPath, KeyPathError, KeySegment, SecretData, SecretValue};

// Re-export built-in backends (no external dependencies)
pub use backends::{EnvBackend, FileBackend};

// Product backends live in separate crates:
// - vaultplate-vault: VaultBackend, VaultConfig
// - vaultplate-aws: AwsSecretsManagerBackend

use async_trait::async_trait;
use thiserror::Error;

/// A backend session could not be established.
///
/// Fatal for a whole run: no document can resolve without a session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Credentials required by the configured auth method are missing
    #[error("Missing credentials for backend '{provider}': {message}")]
    MissingCredentials {
        /// Backend provider name
        provider: String,
        /// What is missing
        message: String,
    },

    /// The backend rejected the login attempt
    #[error("Backend '{provider}' rejected authentication: {message}")]
    Rejected {
        /// Backend provider name
        provider: String,
        /// Error message from the backend
        message: String,
    },
}

impl AuthError {
    /// Create a missing-credentials error
    #[must_use]
    pub fn missing(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MissingCredentials {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a rejected-login error
    #[must_use]
    pub fn rejected(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// A source path could not be retrieved from the backend.
///
/// `Clone` so that a failed fetch can be cached and reported to every
/// placeholder that depends on the same path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Nothing is stored at the source path
    #[error("No secret found at '{path}'")]
    NotFound {
        /// Source path
        path: String,
    },

    /// The session may not read the source path
    #[error("Permission denied reading '{path}': {message}")]
    PermissionDenied {
        /// Source path
        path: String,
        /// Error message from the backend
        message: String,
    },

    /// The backend returned something that is not a flat field map
    #[error("Secret at '{path}' is malformed: {message}")]
    Malformed {
        /// Source path
        path: String,
        /// What was wrong with the payload
        message: String,
    },

    /// The backend call did not complete in time
    #[error("Fetching '{path}' timed out after {seconds} seconds")]
    Timeout {
        /// Source path
        path: String,
        /// Configured timeout
        seconds: u64,
    },

    /// Any other backend failure (network, CLI exit status, ...)
    #[error("Failed to fetch '{path}': {message}")]
    Backend {
        /// Source path
        path: String,
        /// Error message from the backend
        message: String,
    },
}

impl FetchError {
    /// Create a generic backend failure
    #[must_use]
    pub fn backend(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a malformed-payload error
    #[must_use]
    pub fn malformed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// The source path this error refers to
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::NotFound { path }
            | Self::PermissionDenied { path, .. }
            | Self::Malformed { path, .. }
            | Self::Timeout { path, .. }
            | Self::Backend { path, .. } => path,
        }
    }
}

/// Capability interface over secret stores.
///
/// Implementors must provide:
/// - [`fetch_secret_data`](BackendClient::fetch_secret_data) - read all fields at a source path
/// - [`authenticate`](BackendClient::authenticate) - obtain a fresh session
/// - [`provider_name`](BackendClient::provider_name) - provider identifier for selection
///
/// `fetch_secret_data` is called concurrently for distinct paths and must not
/// hold exclusive state across calls.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Get the provider name for this backend.
    ///
    /// Examples: `"vault"`, `"awssecretsmanager"`, `"file"`, `"env"`
    fn provider_name(&self) -> &'static str;

    /// Log in and return a new session.
    async fn authenticate(&self) -> Result<Session, AuthError>;

    /// Check whether an existing session can still be used.
    ///
    /// Backends without sessions accept everything.
    async fn validate_session(&self, _session: &Session) -> bool {
        true
    }

    /// Identity a persisted session is bound to.
    ///
    /// A stored session is only offered back when the scope matches, so a
    /// changed address, auth method or principal forces a new login. `None`
    /// means sessions from this backend are never persisted, which is the case
    /// for credentials the user supplies directly.
    fn session_scope(&self) -> Option<String> {
        None
    }

    /// Read every field stored at `path`.
    async fn fetch_secret_data(
        &self,
        session: &Session,
        path: &str,
    ) -> Result<SecretData, FetchError>;
}

/// Reuse `existing` if the backend still accepts it, otherwise authenticate.
///
/// # Errors
///
/// Returns the backend's [`AuthError`] when a new login is needed and fails.
pub async fn establish_session(
    backend: &dyn BackendClient,
    existing: Option<Session>,
) -> Result<Session, AuthError> {
    if let Some(session) = existing
        && session.provider() == backend.provider_name()
    {
        if backend.validate_session(&session).await {
            tracing::debug!(provider = backend.provider_name(), "Reusing existing session");
            return Ok(session);
        }
        tracing::debug!(
            provider = backend.provider_name(),
            "Existing session rejected, authenticating"
        );
    }

    let session = backend.authenticate().await?;
    tracing::info!(provider = backend.provider_name(), "Authenticated with backend");
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that accepts only the token "fresh" and counts logins
    struct TokenBackend {
        logins: AtomicUsize,
    }

    #[async_trait]
    impl BackendClient for TokenBackend {
        fn provider_name(&self) -> &'static str {
            "token"
        }

        async fn authenticate(&self) -> Result<Session, AuthError> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            Ok(Session::with_token("token", "fresh"))
        }

        async fn validate_session(&self, session: &Session) -> bool {
            session.token() == Some("fresh")
        }

        async fn fetch_secret_data(
            &self,
            _session: &Session,
            path: &str,
        ) -> Result<SecretData, FetchError> {
            Err(FetchError::NotFound {
                path: path.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_establish_session_reuses_valid_session() {
        let backend = TokenBackend {
            logins: AtomicUsize::new(0),
        };
        let existing = Session::with_token("token", "fresh");

        let session = establish_session(&backend, Some(existing)).await.unwrap();
        assert_eq!(session.token(), Some("fresh"));
        assert_eq!(backend.logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_establish_session_authenticates_when_expired() {
        let backend = TokenBackend {
            logins: AtomicUsize::new(0),
        };
        let existing = Session::with_token("token", "stale");

        let session = establish_session(&backend, Some(existing)).await.unwrap();
        assert_eq!(session.token(), Some("fresh"));
        assert_eq!(backend.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_establish_session_ignores_other_provider() {
        let backend = TokenBackend {
            logins: AtomicUsize::new(0),
        };
        let existing = Session::with_token("vault", "fresh");

        establish_session(&backend, Some(existing)).await.unwrap();
        assert_eq!(backend.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_establish_session_without_existing() {
        let backend = TokenBackend {
            logins: AtomicUsize::new(0),
        };
        establish_session(&backend, None).await.unwrap();
        assert_eq!(backend.logins.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_session_scope_is_none() {
        let backend = TokenBackend {
            logins: AtomicUsize::new(0),
        };
        assert_eq!(backend.session_scope(), None);
    }

    #[test]
    fn test_auth_error_display() {
        let err = AuthError::missing("vault", "VAULT_ADDR is not set");
        let msg = err.to_string();
        assert!(msg.contains("vault"));
        assert!(msg.contains("VAULT_ADDR"));

        let err = AuthError::rejected("vault", "invalid role id");
        assert!(err.to_string().contains("rejected"));
    }

    #[test]
    fn test_fetch_error_path() {
        let errors = [
            FetchError::NotFound {
                path: "a".to_string(),
            },
            FetchError::PermissionDenied {
                path: "a".to_string(),
                message: "denied".to_string(),
            },
            FetchError::malformed("a", "not a map"),
            FetchError::Timeout {
                path: "a".to_string(),
                seconds: 5,
            },
            FetchError::backend("a", "connection refused"),
        ];
        for err in errors {
            assert_eq!(err.path(), "a");
            assert!(err.to_string().contains("'a'"));
        }
    }

    #[test]
    fn test_fetch_error_timeout_message() {
        let err = FetchError::Timeout {
            path: "secret/app".to_string(),
            seconds: 30,
        };
        assert_eq!(
            err.to_string(),
            "Fetching 'secret/app' timed out after 30 seconds"
        );
    }
}

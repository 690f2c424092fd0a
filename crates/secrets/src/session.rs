//! Explicit backend sessions
//!
//! A [`Session`] is created by [`BackendClient::authenticate`](crate::BackendClient::authenticate)
//! and threaded through every fetch. It replaces any process-wide login state.

use secrecy::{ExposeSecret, SecretString};

/// An authenticated (or anonymous) backend session.
///
/// The token is held in `secrecy::SecretString`:
/// - it is zeroed from memory when the session is dropped
/// - `Debug` and `Display` show `[REDACTED]` instead of the token
/// - an explicit [`token`](Session::token) call is required to read it
#[derive(Clone)]
pub struct Session {
    provider: String,
    token: Option<SecretString>,
}

impl Session {
    /// A session that carries no credentials.
    ///
    /// Used by backends that authenticate through an external credential
    /// chain (AWS SDK, `vault` CLI token helper) or need no login at all.
    #[must_use]
    pub fn anonymous(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            token: None,
        }
    }

    /// A session holding a backend-issued token.
    #[must_use]
    pub fn with_token(provider: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            token: Some(SecretString::from(token.into())),
        }
    }

    /// Provider name of the backend that issued this session.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Expose the session token.
    ///
    /// The caller must not log or print the returned value.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.expose_secret())
    }

    /// Whether the session carries a token.
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("provider", &self.provider)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.token.is_some() {
            write!(f, "{} session [REDACTED]", self.provider)
        } else {
            write!(f, "{} session (anonymous)", self.provider)
        }
    }
}

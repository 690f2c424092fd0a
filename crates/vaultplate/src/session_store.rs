//! On-disk session persistence
//!
//! Backends that log in (Vault AppRole, Kubernetes, userpass) hand out a session
//! that stays valid across runs. The token is kept in
//! `~/.vaultplate/session.json` together with the backend's
//! [`session_scope`](vaultplate_secrets::BackendClient::session_scope) and
//! offered back to [`establish_session`](vaultplate_secrets::establish_session)
//! only when the scope still matches.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use vaultplate_secrets::Session;

/// Errors reading or writing the session file
#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// No home directory to put the file in
    #[error("Could not determine home directory")]
    NoHome,

    /// Filesystem failure
    #[error("Failed to {operation} {}: {source}", path.display())]
    Io {
        /// What was attempted
        operation: &'static str,
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file exists but is not a session record
    #[error("Invalid session file: {0}")]
    Format(#[from] serde_json::Error),
}

/// Serialized form of a session
#[derive(Serialize, Deserialize)]
struct SessionRecord {
    version: u32,
    provider: String,
    #[serde(default)]
    scope: String,
    token: String,
}

const RECORD_VERSION: u32 = 2;

/// Reads and writes the persisted session
#[derive(Debug, Clone)]
pub struct SessionStore {
    file: PathBuf,
}

impl SessionStore {
    /// Store backed by an explicit file
    #[must_use]
    pub const fn new(file: PathBuf) -> Self {
        Self { file }
    }

    /// Store at `~/.vaultplate/session.json`
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::NoHome`] without a home directory.
    pub fn default_location() -> Result<Self, SessionStoreError> {
        let home = dirs::home_dir().ok_or(SessionStoreError::NoHome)?;
        Ok(Self::new(home.join(".vaultplate").join("session.json")))
    }

    /// Path of the session file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Load the stored session for `provider` logged in as `scope`
    ///
    /// A session stored for another provider or scope is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(
        &self,
        provider: &str,
        scope: &str,
    ) -> Result<Option<Session>, SessionStoreError> {
        if !fs::try_exists(&self.file).await.unwrap_or(false) {
            debug!(file = %self.file.display(), "No stored session");
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.file)
            .await
            .map_err(|source| self.io_error("read", source))?;
        let record: SessionRecord = serde_json::from_str(&contents)?;

        if record.version != RECORD_VERSION || record.provider != provider || record.scope != scope
        {
            debug!(
                stored = %record.provider,
                provider,
                "Stored session does not match backend"
            );
            return Ok(None);
        }
        Ok(Some(Session::with_token(record.provider, record.token)))
    }

    /// Persist `session` under `scope` if it carries a token
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub async fn save(&self, session: &Session, scope: &str) -> Result<(), SessionStoreError> {
        let Some(token) = session.token() else {
            return Ok(());
        };
        let record = SessionRecord {
            version: RECORD_VERSION,
            provider: session.provider().to_string(),
            scope: scope.to_string(),
            token: token.to_string(),
        };
        let json = serde_json::to_string_pretty(&record)?;

        if let Some(parent) = self.file.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| SessionStoreError::Io {
                    operation: "create directory",
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let mut file = open_private(&self.file)
            .await
            .map_err(|source| self.io_error("create", source))?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|source| self.io_error("write", source))?;
        file.flush()
            .await
            .map_err(|source| self.io_error("write", source))?;

        debug!(file = %self.file.display(), provider = session.provider(), "Saved session");
        Ok(())
    }

    fn io_error(&self, operation: &'static str, source: std::io::Error) -> SessionStoreError {
        SessionStoreError::Io {
            operation,
            path: self.file.clone(),
            source,
        }
    }

    /// [`save`](Self::save), logging instead of failing
    pub async fn save_best_effort(&self, session: &Session, scope: &str) {
        if let Err(err) = self.save(session, scope).await {
            warn!(error = %err, "Could not persist backend session");
        }
    }
}

/// Create or truncate a file readable only by the owner
#[cfg(unix)]
async fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .await
}

#[cfg(not(unix))]
async fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path).await
}

//! Static file secret backend

use crate::{AuthError, BackendClient, FetchError, SecretData, Session};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::path::Path;

/// Serves secret data from an in-memory source map
///
/// Loadable from a YAML (or JSON) document of the form:
///
/// ```yaml
/// secret/data/app:
///   username: admin
///   port: 5432
/// secret/data/flags:
///   enabled: true
/// ```
#[derive(Debug, Clone, Default)]
pub struct FileBackend {
    sources: IndexMap<String, SecretData>,
}

impl FileBackend {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source path, builder style
    #[must_use]
    pub fn with_source(mut self, path: impl Into<String>, data: SecretData) -> Self {
        self.insert(path, data);
        self
    }

    /// Add or replace a source path
    pub fn insert(&mut self, path: impl Into<String>, data: SecretData) {
        self.sources.insert(path.into(), data);
    }

    /// Parse a YAML or JSON source map
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Malformed`] if the text is not a map of source
    /// paths to field maps.
    pub fn from_yaml_str(text: &str) -> Result<Self, FetchError> {
        let parsed: IndexMap<String, serde_json::Value> = serde_yaml::from_str(text)
            .map_err(|e| FetchError::malformed("<secrets file>", e.to_string()))?;

        let mut backend = Self::new();
        for (path, value) in parsed {
            let data = SecretData::from_json_object(&path, value)?;
            backend.insert(path, data);
        }
        Ok(backend)
    }

    /// Load a source map from disk
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Backend`] if the file cannot be read and
    /// [`FetchError::Malformed`] if it cannot be parsed.
    pub fn from_file(path: &Path) -> Result<Self, FetchError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FetchError::backend(path.display().to_string(), format!("cannot read file: {e}"))
        })?;
        tracing::debug!(file = %path.display(), "Loading secrets file");
        Self::from_yaml_str(&text)
    }

    /// Known source paths
    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.sources.keys()
    }
}

#[async_trait]
impl BackendClient for FileBackend {
    fn provider_name(&self) -> &'static str {
        "file"
    }

    async fn authenticate(&self) -> Result<Session, AuthError> {
        Ok(Session::anonymous(self.provider_name()))
    }

    async fn fetch_secret_data(
        &self,
        _session: &Session,
        path: &str,
    ) -> Result<SecretData, FetchError> {
        self.sources
            .get(path)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                path: path.to_string(),
            })
    }
}

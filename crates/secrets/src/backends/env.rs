//! Environment variable secret backend

use crate::{AuthError, BackendClient, FetchError, SecretData, Session};
use async_trait::async_trait;

/// Reads secret data from environment variables
///
/// The source path is mapped to a variable name by upper-casing it and
/// replacing every non-alphanumeric character with `_`, after an optional
/// prefix: with prefix `SECRETS_`, path `db/prod` reads `SECRETS_DB_PROD`.
/// The variable must hold a JSON object.
#[derive(Debug, Clone, Default)]
pub struct EnvBackend {
    prefix: String,
}

impl EnvBackend {
    /// Create a backend without a variable prefix
    #[must_use]
    pub const fn new() -> Self {
        Self {
            prefix: String::new(),
        }
    }

    /// Create a backend that prepends `prefix` to every variable name
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Environment variable consulted for `path`
    #[must_use]
    pub fn variable_for(&self, path: &str) -> String {
        let mapped: String = path
            .trim_matches('/')
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{mapped}", self.prefix)
    }
}

#[async_trait]
impl BackendClient for EnvBackend {
    fn provider_name(&self) -> &'static str {
        "env"
    }

    async fn authenticate(&self) -> Result<Session, AuthError> {
        Ok(Session::anonymous(self.provider_name()))
    }

    async fn fetch_secret_data(
        &self,
        _session: &Session,
        path: &str,
    ) -> Result<SecretData, FetchError> {
        let variable = self.variable_for(path);
        let raw = std::env::var(&variable).map_err(|_| FetchError::NotFound {
            path: path.to_string(),
        })?;

        let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
            FetchError::malformed(path, format!("{variable} is not valid JSON: {e}"))
        })?;
        SecretData::from_json_object(path, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SecretValue;

    #[test]
    fn test_variable_mapping() {
        let backend = EnvBackend::new();
        assert_eq!(backend.variable_for("db/prod"), "DB_PROD");
        assert_eq!(backend.variable_for("/secret/data/my-app/"), "SECRET_DATA_MY_APP");

        let prefixed = EnvBackend::with_prefix("SECRETS_");
        assert_eq!(prefixed.variable_for("db"), "SECRETS_DB");
    }

    #[tokio::test]
    async fn test_fetch_from_env() {
        temp_env::async_with_vars(
            [(
                "VP_TEST_ENV_APP",
                Some(r#"{"username": "admin", "port": 5432}"#),
            )],
            async {
                let backend = EnvBackend::with_prefix("VP_TEST_ENV_");
                let session = backend.authenticate().await.unwrap();
                let data = backend.fetch_secret_data(&session, "app").await.unwrap();

                assert_eq!(data.get("username"), Some(&SecretValue::from("admin")));
                assert_eq!(data.get("port"), Some(&SecretValue::from(5432)));
            },
        )
        .await;
    }

    #[tokio::test]
    async fn test_missing_env_var() {
        let backend = EnvBackend::with_prefix("VP_TEST_NONEXISTENT_12345_");
        let session = Session::anonymous("env");
        let result = backend.fetch_secret_data(&session, "app").await;

        assert!(matches!(result, Err(FetchError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_invalid_json() {
        temp_env::async_with_vars([("VP_TEST_ENV_BROKEN", Some("not json"))], async {
            let backend = EnvBackend::with_prefix("VP_TEST_ENV_");
            let session = Session::anonymous("env");
            let result = backend.fetch_secret_data(&session, "broken").await;

            assert!(matches!(result, Err(FetchError::Malformed { .. })));
        })
        .await;
    }
}

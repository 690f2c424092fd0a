//! Run settings
//!
//! Settings come from the environment and may be overridden by a file passed
//! with `--config-path`. The file is YAML (`.yaml`/`.yml`), JSON (`.json`) or
//! `KEY=VALUE` lines (anything else).

use crate::cli::CliError;
use secrecy::SecretString;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use vaultplate_aws::AwsSecretsManagerBackend;
use vaultplate_core::DEFAULT_CONCURRENCY;
use vaultplate_secrets::{BackendClient, DEFAULT_FETCH_TIMEOUT, EnvBackend, FileBackend};
use vaultplate_vault::config::DEFAULT_K8S_TOKEN_PATH;
use vaultplate_vault::{KvVersion, VaultAuth, VaultBackend, VaultConfig};

/// Backend selector
pub const BACKEND: &str = "VAULTPLATE_BACKEND";
/// Prefix joined to `vaultplate.io/path` annotations
pub const PATH_PREFIX: &str = "VAULTPLATE_PATH_PREFIX";
/// Per-call backend timeout in seconds
pub const FETCH_TIMEOUT_SECS: &str = "VAULTPLATE_FETCH_TIMEOUT_SECS";
/// Documents resolved in parallel
pub const CONCURRENCY: &str = "VAULTPLATE_CONCURRENCY";
/// Vault server address
pub const VAULT_ADDR: &str = "VAULT_ADDR";
/// Vault token for token auth
pub const VAULT_TOKEN: &str = "VAULT_TOKEN";
/// Vault auth method
pub const AUTH_TYPE: &str = "VAULTPLATE_AUTH_TYPE";
/// Vault auth mount override
pub const AUTH_MOUNT: &str = "VAULTPLATE_AUTH_MOUNT";
/// AppRole role id
pub const ROLE_ID: &str = "VAULTPLATE_ROLE_ID";
/// AppRole secret id
pub const SECRET_ID: &str = "VAULTPLATE_SECRET_ID";
/// Vault role for Kubernetes auth
pub const K8S_ROLE: &str = "VAULTPLATE_K8S_ROLE";
/// Service account token file for Kubernetes auth
pub const K8S_TOKEN_PATH: &str = "VAULTPLATE_K8S_TOKEN_PATH";
/// Userpass username
pub const USERNAME: &str = "VAULTPLATE_USERNAME";
/// Userpass password
pub const PASSWORD: &str = "VAULTPLATE_PASSWORD";
/// KV engine version (1 or 2)
pub const KV_VERSION: &str = "VAULTPLATE_KV_VERSION";
/// Source map for the `file` backend
pub const SECRETS_FILE: &str = "VAULTPLATE_SECRETS_FILE";
/// Variable prefix for the `env` backend
pub const ENV_PREFIX: &str = "VAULTPLATE_ENV_PREFIX";

/// Every recognised setting
pub const KNOWN_KEYS: &[&str] = &[
    BACKEND,
    PATH_PREFIX,
    FETCH_TIMEOUT_SECS,
    CONCURRENCY,
    VAULT_ADDR,
    VAULT_TOKEN,
    AUTH_TYPE,
    AUTH_MOUNT,
    ROLE_ID,
    SECRET_ID,
    K8S_ROLE,
    K8S_TOKEN_PATH,
    USERNAME,
    PASSWORD,
    KV_VERSION,
    SECRETS_FILE,
    ENV_PREFIX,
];

/// Raw key/value settings before validation
#[derive(Clone, Default)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Values may be credentials
        f.debug_struct("Settings")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Settings {
    /// Read every known key from the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_pairs(
            KNOWN_KEYS
                .iter()
                .filter_map(|key| std::env::var(key).ok().map(|value| (*key, value))),
        )
    }

    /// Build settings from explicit pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Override settings with the contents of `path`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), CliError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CliError::config(format!("Cannot read config file {}: {e}", path.display()))
        })?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let parsed = match extension.as_deref() {
            Some("yaml" | "yml") => parse_mapping(
                serde_yaml::from_str::<serde_json::Value>(&text).map_err(|e| e.to_string()),
            ),
            Some("json") => parse_mapping(
                serde_json::from_str::<serde_json::Value>(&text).map_err(|e| e.to_string()),
            ),
            _ => parse_env_lines(&text),
        }
        .map_err(|message| {
            CliError::config(format!("Invalid config file {}: {message}", path.display()))
        })?;

        tracing::debug!(file = %path.display(), keys = parsed.len(), "Loaded config file");
        for (key, value) in parsed {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                tracing::warn!(key = %key, "Ignoring unknown setting in config file");
                continue;
            }
            self.values.insert(key, value);
        }
        Ok(())
    }

    /// Value of `key`; blank values count as unset
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, key: &str, context: &str) -> Result<&str, CliError> {
        self.get(key).ok_or_else(|| {
            CliError::config_with_help(
                format!("{key} is required for {context}"),
                format!("Set {key} in the environment or the config file"),
            )
        })
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>, CliError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| CliError::config(format!("Invalid {key} '{raw}': {e}")))
            })
            .transpose()
    }
}

/// A YAML/JSON config file must be a flat map of scalars
fn parse_mapping(
    parsed: Result<serde_json::Value, String>,
) -> Result<Vec<(String, String)>, String> {
    let serde_json::Value::Object(map) = parsed? else {
        return Err("expected a mapping of setting names to values".to_string());
    };
    map.into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Null => String::new(),
                _ => return Err(format!("{key} must be a scalar")),
            };
            Ok((key, value))
        })
        .collect()
}

/// dotenv-style `KEY=VALUE` lines
fn parse_env_lines(text: &str) -> Result<Vec<(String, String)>, String> {
    dotenvy::from_read_iter(text.as_bytes())
        .map(|item| item.map_err(|e| e.to_string()))
        .collect()
}

/// Which secret store to read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// HashiCorp Vault
    Vault,
    /// AWS Secrets Manager
    AwsSecretsManager,
    /// Local YAML/JSON source map
    File,
    /// Environment variables
    Env,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vault" => Ok(Self::Vault),
            "awssecretsmanager" => Ok(Self::AwsSecretsManager),
            "file" => Ok(Self::File),
            "env" => Ok(Self::Env),
            _ => Err("expected one of vault, awssecretsmanager, file, env".to_string()),
        }
    }
}

/// Validated settings for one run
#[derive(Debug, Clone)]
pub struct Config {
    /// Selected backend
    pub backend: BackendKind,
    /// Prefix for document source paths
    pub path_prefix: Option<String>,
    /// Per-call backend timeout
    pub fetch_timeout: Duration,
    /// Documents resolved in parallel
    pub concurrency: usize,
    /// Vault settings, used when `backend` is Vault
    pub vault: VaultConfig,
    /// Source map for the file backend
    pub secrets_file: Option<PathBuf>,
    /// Variable prefix for the env backend
    pub env_prefix: String,
}

impl Config {
    /// Read the environment, apply the optional config file and validate
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unreadable files, unknown values or
    /// settings missing for the selected backend.
    pub fn load(config_path: Option<&Path>) -> Result<Self, CliError> {
        let mut settings = Settings::from_env();
        if let Some(path) = config_path {
            settings.merge_file(path)?;
        }
        Self::from_settings(&settings)
    }

    /// Validate raw settings
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown values or settings missing
    /// for the selected backend.
    pub fn from_settings(settings: &Settings) -> Result<Self, CliError> {
        let backend = settings
            .parse::<BackendKind>(BACKEND)?
            .ok_or_else(|| {
                CliError::config_with_help(
                    format!("{BACKEND} is not set"),
                    "Choose one of vault, awssecretsmanager, file, env",
                )
            })?;

        let fetch_timeout = match settings.parse::<u64>(FETCH_TIMEOUT_SECS)? {
            Some(0) => {
                return Err(CliError::config(format!(
                    "{FETCH_TIMEOUT_SECS} must be at least 1"
                )));
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_FETCH_TIMEOUT,
        };
        let concurrency = match settings.parse::<usize>(CONCURRENCY)? {
            Some(0) => {
                return Err(CliError::config(format!("{CONCURRENCY} must be at least 1")));
            }
            Some(n) => n,
            None => DEFAULT_CONCURRENCY,
        };

        let vault = if backend == BackendKind::Vault {
            vault_config(settings)?
        } else {
            VaultConfig::default()
        };

        let secrets_file = if backend == BackendKind::File {
            Some(PathBuf::from(
                settings.require(SECRETS_FILE, "the file backend")?,
            ))
        } else {
            None
        };

        Ok(Self {
            backend,
            path_prefix: settings.get(PATH_PREFIX).map(str::to_string),
            fetch_timeout,
            concurrency,
            vault,
            secrets_file,
            env_prefix: settings.get(ENV_PREFIX).unwrap_or_default().to_string(),
        })
    }
}

fn vault_config(settings: &Settings) -> Result<VaultConfig, CliError> {
    let auth = match settings.get(AUTH_TYPE).unwrap_or("token") {
        "token" => VaultAuth::Token,
        "approle" => VaultAuth::AppRole {
            role_id: settings.require(ROLE_ID, "approle auth")?.to_string(),
            secret_id: SecretString::from(settings.require(SECRET_ID, "approle auth")?),
        },
        "k8s" => VaultAuth::Kubernetes {
            role: settings.require(K8S_ROLE, "k8s auth")?.to_string(),
            token_path: PathBuf::from(
                settings
                    .get(K8S_TOKEN_PATH)
                    .unwrap_or(DEFAULT_K8S_TOKEN_PATH),
            ),
        },
        "userpass" => VaultAuth::UserPass {
            username: settings.require(USERNAME, "userpass auth")?.to_string(),
            password: SecretString::from(settings.require(PASSWORD, "userpass auth")?),
        },
        other => {
            return Err(CliError::config_with_help(
                format!("Unsupported {AUTH_TYPE} '{other}'"),
                "Choose one of token, approle, k8s, userpass",
            ));
        }
    };

    Ok(VaultConfig {
        address: settings.get(VAULT_ADDR).map(str::to_string),
        token: settings.get(VAULT_TOKEN).map(SecretString::from),
        auth,
        auth_mount: settings.get(AUTH_MOUNT).map(str::to_string),
        kv_version: settings.parse::<KvVersion>(KV_VERSION)?.unwrap_or_default(),
    })
}

/// Construct the configured backend
///
/// # Errors
///
/// Returns a configuration error if the file backend's source map cannot be
/// loaded.
pub async fn build_backend(config: &Config) -> Result<Arc<dyn BackendClient>, CliError> {
    let backend: Arc<dyn BackendClient> = match config.backend {
        BackendKind::Vault => Arc::new(VaultBackend::new(config.vault.clone())),
        BackendKind::AwsSecretsManager => Arc::new(AwsSecretsManagerBackend::new().await),
        BackendKind::File => {
            let path = config.secrets_file.as_deref().ok_or_else(|| {
                CliError::config(format!("{SECRETS_FILE} is required for the file backend"))
            })?;
            Arc::new(
                FileBackend::from_file(path)
                    .map_err(|e| CliError::config(format!("Cannot load secrets file: {e}")))?,
            )
        }
        BackendKind::Env => Arc::new(EnvBackend::with_prefix(config.env_prefix.clone())),
    };
    tracing::debug!(provider = backend.provider_name(), "Backend selected");
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        Settings::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_backend_is_required() {
        let err = Config::from_settings(&settings(&[])).unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
        assert!(err.to_string().contains(BACKEND));
    }

    #[test]
    fn test_unknown_backend() {
        let err = Config::from_settings(&settings(&[(BACKEND, "keyring")])).unwrap_err();
        assert!(err.to_string().contains("keyring"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_settings(&settings(&[(BACKEND, "env")])).unwrap();
        assert_eq!(config.backend, BackendKind::Env);
        assert_eq!(config.fetch_timeout, DEFAULT_FETCH_TIMEOUT);
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.path_prefix, None);
        assert_eq!(config.env_prefix, "");
    }

    #[test]
    fn test_numeric_settings() {
        let config = Config::from_settings(&settings(&[
            (BACKEND, "env"),
            (FETCH_TIMEOUT_SECS, "5"),
            (CONCURRENCY, "2"),
            (PATH_PREFIX, "secret/data"),
        ]))
        .unwrap();
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.path_prefix.as_deref(), Some("secret/data"));

        assert!(Config::from_settings(&settings(&[(BACKEND, "env"), (CONCURRENCY, "0")])).is_err());
        assert!(
            Config::from_settings(&settings(&[(BACKEND, "env"), (FETCH_TIMEOUT_SECS, "soon")]))
                .is_err()
        );
    }

    #[test]
    fn test_file_backend_needs_secrets_file() {
        let err = Config::from_settings(&settings(&[(BACKEND, "file")])).unwrap_err();
        assert!(err.to_string().contains(SECRETS_FILE));
    }

    #[test]
    fn test_vault_approle_requires_ids() {
        let err = Config::from_settings(&settings(&[
            (BACKEND, "vault"),
            (AUTH_TYPE, "approle"),
            (ROLE_ID, "role"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains(SECRET_ID));

        let config = Config::from_settings(&settings(&[
            (BACKEND, "vault"),
            (AUTH_TYPE, "approle"),
            (ROLE_ID, "role"),
            (SECRET_ID, "secret"),
            (VAULT_ADDR, "http://127.0.0.1:8200"),
        ]))
        .unwrap();
        assert_eq!(config.vault.auth.method(), "approle");
        assert!(config.vault.uses_http());
    }

    #[test]
    fn test_vault_k8s_default_token_path() {
        let config = Config::from_settings(&settings(&[
            (BACKEND, "vault"),
            (AUTH_TYPE, "k8s"),
            (K8S_ROLE, "argocd"),
            (KV_VERSION, "1"),
        ]))
        .unwrap();
        match config.vault.auth {
            VaultAuth::Kubernetes { role, token_path } => {
                assert_eq!(role, "argocd");
                assert_eq!(token_path, PathBuf::from(DEFAULT_K8S_TOKEN_PATH));
            }
            other => panic!("unexpected auth {other:?}"),
        }
        assert_eq!(config.vault.kv_version, KvVersion::V1);
    }

    #[test]
    fn test_vault_unknown_auth_type() {
        let err = Config::from_settings(&settings(&[(BACKEND, "vault"), (AUTH_TYPE, "github")]))
            .unwrap_err();
        assert!(err.to_string().contains("github"));
    }

    #[test]
    fn test_env_lines() {
        let pairs = parse_env_lines(
            "# comment\n\nVAULTPLATE_BACKEND=file\nexport VAULTPLATE_PATH_PREFIX=\"secret/data\"\n",
        )
        .unwrap();
        assert_eq!(
            pairs,
            vec![
                (BACKEND.to_string(), "file".to_string()),
                (PATH_PREFIX.to_string(), "secret/data".to_string()),
            ]
        );
        assert!(parse_env_lines("not a pair").is_err());
    }

    #[test]
    fn test_env_lines_comments_and_escapes() {
        let pairs = parse_env_lines(
            "VAULTPLATE_PATH_PREFIX=secret/data # team prefix\nVAULTPLATE_PASSWORD=\"p\\\"w\"\n",
        )
        .unwrap();
        assert_eq!(
            pairs,
            vec![
                (PATH_PREFIX.to_string(), "secret/data".to_string()),
                (PASSWORD.to_string(), "p\"w".to_string()),
            ]
        );
    }

    #[test]
    fn test_config_file_overrides_environment() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "VAULTPLATE_BACKEND: file\nVAULTPLATE_CONCURRENCY: 3\nOTHER: x").unwrap();

        let mut base = settings(&[(BACKEND, "env"), (PATH_PREFIX, "kv")]);
        base.merge_file(file.path()).unwrap();

        assert_eq!(base.get(BACKEND), Some("file"));
        assert_eq!(base.get(CONCURRENCY), Some("3"));
        assert_eq!(base.get(PATH_PREFIX), Some("kv"));
        assert_eq!(base.get("OTHER"), None);
    }

    #[test]
    fn test_json_config_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"VAULTPLATE_BACKEND": "env", "VAULTPLATE_ENV_PREFIX": "APP_"}}"#).unwrap();

        let mut base = Settings::default();
        base.merge_file(file.path()).unwrap();
        let config = Config::from_settings(&base).unwrap();
        assert_eq!(config.env_prefix, "APP_");
    }

    #[test]
    fn test_config_file_must_be_mapping() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "- a\n- b").unwrap();
        let err = Settings::default().merge_file(file.path()).unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
    }

    #[test]
    fn test_from_env_reads_known_keys() {
        temp_env::with_vars(
            [
                (BACKEND, Some("env")),
                (PATH_PREFIX, Some("secret/data")),
                ("VAULTPLATE_UNRELATED", Some("x")),
            ],
            || {
                let settings = Settings::from_env();
                assert_eq!(settings.get(BACKEND), Some("env"));
                assert_eq!(settings.get(PATH_PREFIX), Some("secret/data"));
                assert_eq!(settings.get("VAULTPLATE_UNRELATED"), None);
            },
        );
    }

    #[test]
    fn test_settings_debug_hides_values() {
        let settings = settings(&[(VAULT_TOKEN, "hvs.secret")]);
        let debug = format!("{settings:?}");
        assert!(debug.contains(VAULT_TOKEN));
        assert!(!debug.contains("hvs.secret"));
    }

    #[tokio::test]
    async fn test_build_file_backend() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "secret/app:\n  password: s3cr3t").unwrap();

        let config = Config::from_settings(&Settings::from_pairs([
            (BACKEND, "file".to_string()),
            (SECRETS_FILE, file.path().display().to_string()),
        ]))
        .unwrap();
        let backend = build_backend(&config).await.unwrap();
        assert_eq!(backend.provider_name(), "file");
    }

    #[tokio::test]
    async fn test_build_file_backend_missing_file() {
        let config = Config::from_settings(&settings(&[
            (BACKEND, "file"),
            (SECRETS_FILE, "/nonexistent/secrets.yaml"),
        ]))
        .unwrap();
        let err = build_backend(&config).await.err().unwrap();
        assert!(matches!(err, CliError::Config { .. }));
    }
}

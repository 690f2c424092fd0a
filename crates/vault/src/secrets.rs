//! `HashiCorp` Vault backend with dual-mode (HTTP + CLI) access

use crate::config::{KvVersion, VaultAuth, VaultConfig};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::Value;
use tokio::process::Command;
use vaultplate_secrets::{AuthError, BackendClient, FetchError, SecretData, Session};
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;

const PROVIDER: &str = "vault";

/// Reads KV secrets from `HashiCorp` Vault
///
/// Mode follows the configuration:
/// - [`VaultConfig::address`] set → HTTP mode through `vaultrs`
/// - otherwise → CLI mode (`vault kv get -format=json`)
///
/// Source paths are `<mount>/<secret path>`. For KV v2 an explicit `data/`
/// segment after the mount is accepted and stripped, so both
/// `secret/data/app` and `secret/app` address the same secret.
pub struct VaultBackend {
    config: VaultConfig,
}

impl std::fmt::Debug for VaultBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultBackend")
            .field("mode", &if self.config.uses_http() { "http" } else { "cli" })
            .field("auth", &self.config.auth.method())
            .field("kv_version", &self.config.kv_version)
            .finish()
    }
}

impl VaultBackend {
    /// Create a backend from explicit settings
    #[must_use]
    pub const fn new(config: VaultConfig) -> Self {
        Self { config }
    }

    /// The settings this backend was built with
    #[must_use]
    pub const fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Build an HTTP client, optionally carrying a token
    fn http_client(&self, token: Option<&str>) -> Result<VaultClient, String> {
        let address = self
            .config
            .address
            .as_deref()
            .ok_or_else(|| "VAULT_ADDR is not set".to_string())?;

        let mut builder = VaultClientSettingsBuilder::default();
        builder.address(address);
        if let Some(token) = token {
            builder.token(token);
        }
        let settings = builder
            .build()
            .map_err(|e| format!("Failed to build Vault client: {e}"))?;
        VaultClient::new(settings).map_err(|e| format!("Failed to create Vault client: {e}"))
    }

    /// Log in over HTTP with the configured auth method
    async fn authenticate_http(&self) -> Result<Session, AuthError> {
        let mount = self.config.auth_mount();
        let client = |token: Option<&str>| {
            self.http_client(token)
                .map_err(|e| AuthError::missing(PROVIDER, e))
        };

        let login = match &self.config.auth {
            VaultAuth::Token => {
                let token = self
                    .config
                    .token_str()
                    .ok_or_else(|| AuthError::missing(PROVIDER, "VAULT_TOKEN is not set"))?;
                vaultrs::token::lookup_self(&client(Some(token))?)
                    .await
                    .map_err(|e| AuthError::rejected(PROVIDER, e.to_string()))?;
                return Ok(Session::with_token(PROVIDER, token));
            }
            VaultAuth::AppRole { role_id, secret_id } => {
                vaultrs::auth::approle::login(
                    &client(None)?,
                    mount,
                    role_id,
                    secret_id.expose_secret(),
                )
                .await
            }
            VaultAuth::Kubernetes { role, token_path } => {
                let jwt = tokio::fs::read_to_string(token_path).await.map_err(|e| {
                    AuthError::missing(
                        PROVIDER,
                        format!(
                            "Cannot read service account token at {}: {e}",
                            token_path.display()
                        ),
                    )
                })?;
                vaultrs::auth::kubernetes::login(&client(None)?, mount, role, jwt.trim()).await
            }
            VaultAuth::UserPass { username, password } => {
                vaultrs::auth::userpass::login(
                    &client(None)?,
                    mount,
                    username,
                    password.expose_secret(),
                )
                .await
            }
        };

        let info = login.map_err(|e| AuthError::rejected(PROVIDER, e.to_string()))?;
        tracing::debug!(
            method = self.config.auth.method(),
            mount,
            "Vault login succeeded"
        );
        Ok(Session::with_token(PROVIDER, info.client_token))
    }

    /// In CLI mode the `vault` binary owns login; only check that it works
    async fn authenticate_cli(&self) -> Result<Session, AuthError> {
        if !matches!(self.config.auth, VaultAuth::Token) {
            return Err(AuthError::missing(
                PROVIDER,
                format!(
                    "VAULT_ADDR is required for {} authentication",
                    self.config.auth.method()
                ),
            ));
        }

        let session = match self.config.token_str() {
            Some(token) => Session::with_token(PROVIDER, token),
            None => Session::anonymous(PROVIDER),
        };

        let output = cli_command(&session)
            .args(["token", "lookup", "-format=json"])
            .output()
            .await
            .map_err(|e| AuthError::missing(PROVIDER, format!("Failed to execute vault CLI: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuthError::rejected(PROVIDER, stderr.trim().to_string()));
        }
        Ok(session)
    }

    async fn fetch_http(&self, session: &Session, path: &str) -> Result<SecretData, FetchError> {
        let (mount, secret) = split_path(self.config.kv_version, path)?;
        let client = self
            .http_client(session.token())
            .map_err(|e| FetchError::backend(path, e))?;

        let value: Value = match self.config.kv_version {
            KvVersion::V2 => vaultrs::kv2::read(&client, &mount, &secret).await,
            KvVersion::V1 => vaultrs::kv1::get(&client, &mount, &secret).await,
        }
        .map_err(|e| map_client_error(path, e))?;

        SecretData::from_json_object(path, value)
    }

    async fn fetch_cli(&self, session: &Session, path: &str) -> Result<SecretData, FetchError> {
        let (mount, secret) = split_path(self.config.kv_version, path)?;
        let mount_arg = format!("-mount={mount}");

        let output = cli_command(session)
            .args(["kv", "get", "-format=json", &mount_arg, &secret])
            .output()
            .await
            .map_err(|e| FetchError::backend(path, format!("Failed to execute vault CLI: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_cli_failure(path, &stderr));
        }

        let value = extract_cli_payload(path, &output.stdout, self.config.kv_version)?;
        SecretData::from_json_object(path, value)
    }
}

#[async_trait]
impl BackendClient for VaultBackend {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    async fn authenticate(&self) -> Result<Session, AuthError> {
        if self.config.uses_http() {
            self.authenticate_http().await
        } else {
            self.authenticate_cli().await
        }
    }

    fn session_scope(&self) -> Option<String> {
        // Tokens from VAULT_TOKEN or the CLI token helper belong to the user
        let address = self.config.address.as_deref()?;
        let principal = match &self.config.auth {
            VaultAuth::Token => return None,
            VaultAuth::AppRole { role_id, .. } => role_id,
            VaultAuth::Kubernetes { role, .. } => role,
            VaultAuth::UserPass { username, .. } => username,
        };
        Some(format!(
            "{address}|{}:{}|{principal}",
            self.config.auth.method(),
            self.config.auth_mount()
        ))
    }

    async fn validate_session(&self, session: &Session) -> bool {
        if self.config.uses_http() {
            let Some(token) = session.token() else {
                return false;
            };
            let Ok(client) = self.http_client(Some(token)) else {
                return false;
            };
            vaultrs::token::lookup_self(&client).await.is_ok()
        } else {
            cli_command(session)
                .args(["token", "lookup", "-format=json"])
                .output()
                .await
                .is_ok_and(|output| output.status.success())
        }
    }

    async fn fetch_secret_data(
        &self,
        session: &Session,
        path: &str,
    ) -> Result<SecretData, FetchError> {
        if self.config.uses_http() {
            self.fetch_http(session, path).await
        } else {
            self.fetch_cli(session, path).await
        }
    }
}

/// `vault` invocation carrying the session token, if any
fn cli_command(session: &Session) -> Command {
    let mut command = Command::new("vault");
    if let Some(token) = session.token() {
        command.env("VAULT_TOKEN", token);
    }
    command
}

/// Split a source path into `(mount, secret path)`
fn split_path(kv_version: KvVersion, path: &str) -> Result<(String, String), FetchError> {
    let trimmed = path.trim_matches('/');
    let Some((mount, rest)) = trimmed.split_once('/') else {
        return Err(FetchError::malformed(
            path,
            "expected '<mount>/<secret path>'",
        ));
    };

    let rest = match kv_version {
        KvVersion::V2 => rest.strip_prefix("data/").unwrap_or(rest),
        KvVersion::V1 => rest,
    };
    if mount.is_empty() || rest.is_empty() {
        return Err(FetchError::malformed(
            path,
            "expected '<mount>/<secret path>'",
        ));
    }
    Ok((mount.to_string(), rest.to_string()))
}

/// Map a `vaultrs` error onto the fetch taxonomy
fn map_client_error(path: &str, err: ClientError) -> FetchError {
    match err {
        ClientError::APIError { code: 404, .. } => FetchError::NotFound {
            path: path.to_string(),
        },
        ClientError::APIError { code: 403, errors } => FetchError::PermissionDenied {
            path: path.to_string(),
            message: errors.join(", "),
        },
        other => FetchError::backend(path, format!("Vault read error: {other}")),
    }
}

/// Interpret the stderr of a failed `vault kv get`
fn classify_cli_failure(path: &str, stderr: &str) -> FetchError {
    let message = stderr.trim();
    let lower = message.to_lowercase();
    if lower.contains("no value found") {
        FetchError::NotFound {
            path: path.to_string(),
        }
    } else if lower.contains("permission denied") || lower.contains("code: 403") {
        FetchError::PermissionDenied {
            path: path.to_string(),
            message: message.to_string(),
        }
    } else {
        FetchError::backend(path, format!("vault CLI failed: {message}"))
    }
}

/// Extract the secret's field map from `vault kv get -format=json` output
fn extract_cli_payload(path: &str, stdout: &[u8], kv_version: KvVersion) -> Result<Value, FetchError> {
    let mut response: Value = serde_json::from_slice(stdout)
        .map_err(|e| FetchError::malformed(path, format!("invalid vault CLI output: {e}")))?;

    let data = response
        .get_mut("data")
        .map(Value::take)
        .ok_or_else(|| FetchError::malformed(path, "vault CLI output has no 'data'"))?;

    match kv_version {
        KvVersion::V1 => Ok(data),
        KvVersion::V2 => match data {
            Value::Object(mut envelope) => envelope
                .remove("data")
                .ok_or_else(|| FetchError::malformed(path, "KV v2 response has no 'data.data'")),
            _ => Err(FetchError::malformed(path, "KV v2 response is not an object")),
        },
    }
}

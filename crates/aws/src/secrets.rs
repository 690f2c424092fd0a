//! AWS Secrets Manager backend with auto-negotiating dual-mode (SDK + CLI)

use async_trait::async_trait;
use aws_sdk_secretsmanager::Client;
use aws_sdk_secretsmanager::operation::get_secret_value::GetSecretValueError;
use tokio::process::Command;
use vaultplate_secrets::{AuthError, BackendClient, FetchError, SecretData, Session};

const PROVIDER: &str = "awssecretsmanager";

/// A parsed source path: `<secret id>[?version_stage=..][&version_id=..]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
    /// Secret name or ARN
    pub secret_id: String,
    /// Specific version ID
    pub version_id: Option<String>,
    /// Version stage label (AWS defaults to `AWSCURRENT`)
    pub version_stage: Option<String>,
}

impl SecretRef {
    /// Parse a source path.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Malformed`] for an empty id or an unknown query parameter.
    pub fn parse(path: &str) -> Result<Self, FetchError> {
        let (secret_id, query) = path.split_once('?').unwrap_or((path, ""));
        let secret_id = secret_id.trim();
        if secret_id.is_empty() {
            return Err(FetchError::malformed(path, "secret id is empty"));
        }

        let mut secret = Self {
            secret_id: secret_id.to_string(),
            version_id: None,
            version_stage: None,
        };

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            if value.is_empty() {
                return Err(FetchError::malformed(
                    path,
                    format!("query parameter '{name}' has no value"),
                ));
            }
            match name {
                "version_id" => secret.version_id = Some(value.to_string()),
                "version_stage" => secret.version_stage = Some(value.to_string()),
                other => {
                    return Err(FetchError::malformed(
                        path,
                        format!("unknown query parameter '{other}'"),
                    ));
                }
            }
        }

        Ok(secret)
    }
}

/// Reads JSON secrets from AWS Secrets Manager
///
/// Mode is auto-negotiated based on environment:
/// - If `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY` are set → SDK mode
/// - Otherwise → CLI mode (uses `aws` CLI and its configured profile)
pub struct AwsSecretsManagerBackend {
    http_client: Option<Client>,
}

impl std::fmt::Debug for AwsSecretsManagerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSecretsManagerBackend")
            .field("mode", &if self.can_use_http() { "http" } else { "cli" })
            .finish()
    }
}

impl AwsSecretsManagerBackend {
    /// Create a backend with auto-detected mode
    ///
    /// Loads the SDK configuration (region, credential chain) only when
    /// credentials are present in the environment.
    pub async fn new() -> Self {
        let http_client = if Self::http_credentials_available() {
            let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .load()
                .await;
            Some(Client::new(&config))
        } else {
            None
        };

        Self { http_client }
    }

    /// Create a backend that always uses the given SDK client
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self {
            http_client: Some(client),
        }
    }

    /// Create a backend that always shells out to the `aws` CLI
    #[must_use]
    pub const fn cli() -> Self {
        Self { http_client: None }
    }

    /// Check if SDK credentials are available in environment
    fn http_credentials_available() -> bool {
        std::env::var("AWS_ACCESS_KEY_ID").is_ok() && std::env::var("AWS_SECRET_ACCESS_KEY").is_ok()
    }

    /// Check if this backend uses the SDK
    const fn can_use_http(&self) -> bool {
        self.http_client.is_some()
    }

    async fn fetch_http(
        client: &Client,
        path: &str,
        secret: &SecretRef,
    ) -> Result<SecretData, FetchError> {
        let mut request = client.get_secret_value().secret_id(&secret.secret_id);

        if let Some(version_id) = &secret.version_id {
            request = request.version_id(version_id);
        }

        if let Some(version_stage) = &secret.version_stage {
            request = request.version_stage(version_stage);
        }

        let response = request.send().await.map_err(|e| {
            if e.as_service_error()
                .is_some_and(GetSecretValueError::is_resource_not_found_exception)
            {
                FetchError::NotFound {
                    path: path.to_string(),
                }
            } else {
                FetchError::backend(path, format!("AWS Secrets Manager error: {e}"))
            }
        })?;

        let secret_string = response.secret_string().ok_or_else(|| {
            FetchError::malformed(path, "secret has no string value (may be binary)")
        })?;

        parse_secret_string(path, secret_string)
    }

    async fn fetch_cli(path: &str, secret: &SecretRef) -> Result<SecretData, FetchError> {
        let mut args = vec![
            "secretsmanager".to_string(),
            "get-secret-value".to_string(),
            "--secret-id".to_string(),
            secret.secret_id.clone(),
            "--query".to_string(),
            "SecretString".to_string(),
            "--output".to_string(),
            "text".to_string(),
        ];

        if let Some(version_id) = &secret.version_id {
            args.push("--version-id".to_string());
            args.push(version_id.clone());
        }

        if let Some(version_stage) = &secret.version_stage {
            args.push("--version-stage".to_string());
            args.push(version_stage.clone());
        }

        let output = Command::new("aws")
            .args(&args)
            .output()
            .await
            .map_err(|e| FetchError::backend(path, format!("Failed to execute aws CLI: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_cli_failure(path, &stderr));
        }

        let secret_string = String::from_utf8_lossy(&output.stdout);
        parse_secret_string(path, secret_string.trim())
    }
}

#[async_trait]
impl BackendClient for AwsSecretsManagerBackend {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    /// Credentials come from the SDK chain or the CLI profile; there is no
    /// token to hold on to.
    async fn authenticate(&self) -> Result<Session, AuthError> {
        Ok(Session::anonymous(PROVIDER))
    }

    async fn fetch_secret_data(
        &self,
        _session: &Session,
        path: &str,
    ) -> Result<SecretData, FetchError> {
        let secret = SecretRef::parse(path)?;
        tracing::debug!(
            secret_id = %secret.secret_id,
            mode = if self.can_use_http() { "http" } else { "cli" },
            "Reading AWS secret"
        );

        match &self.http_client {
            Some(client) => Self::fetch_http(client, path, &secret).await,
            None => Self::fetch_cli(path, &secret).await,
        }
    }
}

/// Decode a secret string holding a JSON object
fn parse_secret_string(path: &str, secret_string: &str) -> Result<SecretData, FetchError> {
    let value: serde_json::Value = serde_json::from_str(secret_string)
        .map_err(|e| FetchError::malformed(path, format!("secret string is not JSON: {e}")))?;
    SecretData::from_json_object(path, value)
}

/// Interpret the stderr of a failed `aws secretsmanager get-secret-value`
fn classify_cli_failure(path: &str, stderr: &str) -> FetchError {
    let message = stderr.trim();
    if message.contains("ResourceNotFoundException") {
        FetchError::NotFound {
            path: path.to_string(),
        }
    } else if message.contains("AccessDenied") {
        FetchError::PermissionDenied {
            path: path.to_string(),
            message: message.to_string(),
        }
    } else {
        FetchError::backend(path, format!("aws CLI failed: {message}"))
    }
}

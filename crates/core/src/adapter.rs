//! Resource adapters
//!
//! One adapter per output kind. An adapter decides which top-level fields are
//! substituted, how resolved values are written back, and validates the
//! finished document against the kind's schema.

use crate::error::{DocumentError, ResolutionCause};
use crate::resolver::{Resolved, render_text};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// How a resolved value is written back into the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Whole-value placeholders keep their native JSON type
    Native,
    /// Every resolved value becomes a string
    Text,
    /// Every resolved value becomes base64 encoded text
    Bytes,
}

impl Coercion {
    /// Turn a resolved placeholder into the value to store.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionCause::Coercion`] when a `null` must become text.
    pub fn apply(self, resolved: Resolved) -> Result<Value, ResolutionCause> {
        let text = match (self, resolved) {
            (Self::Native, Resolved::Native(value)) => return Ok(value.to_json()),
            (_, Resolved::Text(text)) => text,
            (Self::Text | Self::Bytes, Resolved::Native(value)) => render_text(&value)?,
        };

        Ok(match self {
            Self::Bytes => Value::String(STANDARD.encode(text)),
            Self::Native | Self::Text => Value::String(text),
        })
    }
}

/// Kind-specific substitution policy and schema validation
pub trait ResourceAdapter: Send + Sync {
    /// Kind handled by this adapter (`"*"` for the fallback)
    fn kind(&self) -> &'static str;

    /// Coercion for the top-level field `field`, or `None` if it is never substituted
    fn scope(&self, field: &str) -> Option<Coercion>;

    /// Validate the resolved document and re-emit it.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Serialization`] if the document does not match
    /// the kind's schema.
    fn finalize(&self, document: Value) -> Result<Value, DocumentError>;
}

/// Select the adapter for a document's `kind`
#[must_use]
pub fn adapter_for(kind: Option<&str>) -> &'static dyn ResourceAdapter {
    match kind {
        Some("Secret") => &SecretAdapter,
        Some("ConfigMap") => &ConfigMapAdapter,
        _ => &GenericAdapter,
    }
}

/// Standard object metadata; label and annotation values must be strings
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    labels: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    annotations: Option<IndexMap<String, String>>,
    #[serde(flatten)]
    rest: IndexMap<String, Value>,
}

/// `v1/Secret`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SecretManifest {
    api_version: String,
    kind: String,
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    secret_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    immutable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_data: Option<IndexMap<String, String>>,
}

/// `v1/ConfigMap`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ConfigMapManifest {
    api_version: String,
    kind: String,
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    immutable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    binary_data: Option<IndexMap<String, String>>,
}

/// `Secret`: metadata and `stringData` as text, `data` base64 encoded
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretAdapter;

impl ResourceAdapter for SecretAdapter {
    fn kind(&self) -> &'static str {
        "Secret"
    }

    fn scope(&self, field: &str) -> Option<Coercion> {
        match field {
            "metadata" | "stringData" => Some(Coercion::Text),
            "data" => Some(Coercion::Bytes),
            _ => None,
        }
    }

    fn finalize(&self, document: Value) -> Result<Value, DocumentError> {
        let manifest: SecretManifest = parse_manifest(self.kind(), document)?;
        require_core_api(self.kind(), &manifest.api_version)?;
        if let Some(data) = &manifest.data {
            require_base64(self.kind(), "data", data)?;
        }
        emit(self.kind(), &manifest)
    }
}

/// `ConfigMap`: metadata and `data` as text, `binaryData` base64 encoded
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigMapAdapter;

impl ResourceAdapter for ConfigMapAdapter {
    fn kind(&self) -> &'static str {
        "ConfigMap"
    }

    fn scope(&self, field: &str) -> Option<Coercion> {
        match field {
            "metadata" | "data" => Some(Coercion::Text),
            "binaryData" => Some(Coercion::Bytes),
            _ => None,
        }
    }

    fn finalize(&self, document: Value) -> Result<Value, DocumentError> {
        let manifest: ConfigMapManifest = parse_manifest(self.kind(), document)?;
        require_core_api(self.kind(), &manifest.api_version)?;
        if let Some(binary) = &manifest.binary_data {
            require_base64(self.kind(), "binaryData", binary)?;
        }
        emit(self.kind(), &manifest)
    }
}

/// Any other kind: every field except `apiVersion`/`kind`, native types kept
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericAdapter;

impl ResourceAdapter for GenericAdapter {
    fn kind(&self) -> &'static str {
        "*"
    }

    fn scope(&self, field: &str) -> Option<Coercion> {
        match field {
            "apiVersion" | "kind" => None,
            _ => Some(Coercion::Native),
        }
    }

    fn finalize(&self, document: Value) -> Result<Value, DocumentError> {
        let kind = document
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or("resource")
            .to_string();
        let fail = |message: &str| Err(DocumentError::serialization(kind.as_str(), message));

        let Value::Object(map) = &document else {
            return fail("document is not a mapping");
        };
        if !map.get("apiVersion").is_some_and(Value::is_string) {
            return fail("apiVersion must be a string");
        }
        if !map.get("kind").is_some_and(Value::is_string) {
            return fail("kind must be a string");
        }
        if map.get("metadata").is_some_and(|m| !m.is_object()) {
            return fail("metadata must be a mapping");
        }
        Ok(document)
    }
}

fn parse_manifest<T: DeserializeOwned>(kind: &str, document: Value) -> Result<T, DocumentError> {
    serde_json::from_value(document).map_err(|e| DocumentError::serialization(kind, e.to_string()))
}

fn emit<T: Serialize>(kind: &str, manifest: &T) -> Result<Value, DocumentError> {
    serde_json::to_value(manifest).map_err(|e| DocumentError::serialization(kind, e.to_string()))
}

fn require_core_api(kind: &str, api_version: &str) -> Result<(), DocumentError> {
    if api_version == "v1" {
        Ok(())
    } else {
        Err(DocumentError::serialization(
            kind,
            format!("unsupported apiVersion '{api_version}', expected 'v1'"),
        ))
    }
}

fn require_base64(
    kind: &str,
    field: &str,
    entries: &IndexMap<String, String>,
) -> Result<(), DocumentError> {
    for (key, value) in entries {
        STANDARD.decode(value).map_err(|e| {
            DocumentError::serialization(kind, format!("{field}.{key} is not valid base64: {e}"))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vaultplate_secrets::SecretValue;

    #[test]
    fn test_adapter_selection() {
        assert_eq!(adapter_for(Some("Secret")).kind(), "Secret");
        assert_eq!(adapter_for(Some("ConfigMap")).kind(), "ConfigMap");
        assert_eq!(adapter_for(Some("Deployment")).kind(), "*");
        assert_eq!(adapter_for(None).kind(), "*");
    }

    #[test]
    fn test_coercion_of_native_bool() {
        let resolved = Resolved::Native(SecretValue::Bool(true));
        assert_eq!(Coercion::Native.apply(resolved.clone()).unwrap(), json!(true));
        assert_eq!(Coercion::Text.apply(resolved.clone()).unwrap(), json!("true"));
        assert_eq!(Coercion::Bytes.apply(resolved).unwrap(), json!("dHJ1ZQ=="));
    }

    #[test]
    fn test_coercion_of_text() {
        let resolved = Resolved::Text("a-b".to_string());
        assert_eq!(Coercion::Native.apply(resolved.clone()).unwrap(), json!("a-b"));
        assert_eq!(Coercion::Bytes.apply(resolved).unwrap(), json!("YS1i"));
    }

    #[test]
    fn test_coercion_of_null() {
        assert_eq!(
            Coercion::Native
                .apply(Resolved::Native(SecretValue::Null))
                .unwrap(),
            Value::Null
        );
        assert!(matches!(
            Coercion::Bytes.apply(Resolved::Native(SecretValue::Null)),
            Err(ResolutionCause::Coercion { .. })
        ));
    }

    #[test]
    fn test_scopes() {
        assert_eq!(SecretAdapter.scope("data"), Some(Coercion::Bytes));
        assert_eq!(SecretAdapter.scope("stringData"), Some(Coercion::Text));
        assert_eq!(SecretAdapter.scope("metadata"), Some(Coercion::Text));
        assert_eq!(SecretAdapter.scope("type"), None);
        assert_eq!(ConfigMapAdapter.scope("binaryData"), Some(Coercion::Bytes));
        assert_eq!(ConfigMapAdapter.scope("data"), Some(Coercion::Text));
        assert_eq!(GenericAdapter.scope("spec"), Some(Coercion::Native));
        assert_eq!(GenericAdapter.scope("apiVersion"), None);
    }

    #[test]
    fn test_secret_finalize_emits_schema_order() {
        let document = json!({
            "data": {"password": "czNjcjN0"},
            "type": "Opaque",
            "metadata": {"name": "db", "labels": {"app": "db"}, "uid": "1234"},
            "kind": "Secret",
            "apiVersion": "v1"
        });

        let out = SecretAdapter.finalize(document).unwrap();
        let keys: Vec<_> = out.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["apiVersion", "kind", "metadata", "type", "data"]);
        assert_eq!(out["metadata"]["uid"], "1234");
        assert_eq!(out["data"]["password"], "czNjcjN0");
    }

    #[test]
    fn test_secret_rejects_invalid_documents() {
        let cases = [
            json!({"apiVersion": "v1", "kind": "Secret", "data": {"a": "not base64!"}}),
            json!({"apiVersion": "v1", "kind": "Secret", "data": {"a": 1}}),
            json!({"apiVersion": "v1", "kind": "Secret", "spec": {}}),
            json!({"apiVersion": "v1", "kind": "Secret", "metadata": {"labels": {"a": true}}}),
            json!({"apiVersion": "v2", "kind": "Secret"}),
            json!({"kind": "Secret"}),
        ];
        for document in cases {
            let err = SecretAdapter.finalize(document.clone()).unwrap_err();
            assert!(
                matches!(err, DocumentError::Serialization { .. }),
                "{document}"
            );
        }
    }

    #[test]
    fn test_configmap_finalize() {
        let document = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "settings"},
            "data": {"enabled": "true"},
            "binaryData": {"blob": "AAEC"}
        });
        let out = ConfigMapAdapter.finalize(document.clone()).unwrap();
        assert_eq!(out, document);

        let err = ConfigMapAdapter
            .finalize(json!({"apiVersion": "v1", "kind": "ConfigMap", "data": {"n": 1}}))
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid ConfigMap"));
    }

    #[test]
    fn test_generic_finalize() {
        let document = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web"},
            "spec": {"replicas": 3, "paused": false}
        });
        assert_eq!(GenericAdapter.finalize(document.clone()).unwrap(), document);

        for document in [
            json!({"kind": "Deployment"}),
            json!({"apiVersion": 1, "kind": "Deployment"}),
            json!({"apiVersion": "v1", "kind": "Pod", "metadata": "web"}),
            json!(["not", "a", "mapping"]),
        ] {
            assert!(GenericAdapter.finalize(document).is_err());
        }
    }
}

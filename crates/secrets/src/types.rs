//! Secret values fetched from a backend
//!
//! - [`SecretValue`]: tagged variant for one field (`null`, bool, number, string, structured)
//! - [`SecretData`]: the flat field map fetched for one source path
//! - [`KeyPath`]: a field name with an optional dotted/bracketed sub-path

use crate::FetchError;
use indexmap::IndexMap;
use serde_json::{Number, Value};
use thiserror::Error;

/// One field value from a secret store.
///
/// Untyped stores hand back strings, numbers and booleans; some (Vault KV,
/// JSON secrets in AWS) can also nest objects and arrays, which are kept as
/// [`SecretValue::Structured`] so sub-paths can be looked up in them.
#[derive(Debug, Clone, PartialEq)]
pub enum SecretValue {
    /// JSON `null`
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer or floating point number
    Number(Number),
    /// Text value
    String(String),
    /// Nested object or array
    Structured(Value),
}

impl SecretValue {
    /// Convert a JSON value, keeping scalars as their native variant.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            structured @ (Value::Array(_) | Value::Object(_)) => Self::Structured(structured),
        }
    }

    /// Convert back into a JSON value with the native type preserved.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
            Self::Structured(v) => v.clone(),
        }
    }

    /// Human-readable type name, used in coercion errors.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Structured(Value::Array(_)) => "array",
            Self::Structured(_) => "object",
        }
    }

    /// Textual form of the value.
    ///
    /// Strings verbatim, numbers in decimal, booleans as `true`/`false`,
    /// structured values as compact JSON. `null` has no textual form.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Number(n) => Some(n.to_string()),
            Self::String(s) => Some(s.clone()),
            Self::Structured(v) => Some(v.to_string()),
        }
    }

    /// Walk into a structured value.
    ///
    /// Returns `None` when a segment does not exist or the value is a scalar.
    #[must_use]
    pub fn lookup(&self, segments: &[KeySegment]) -> Option<Self> {
        if segments.is_empty() {
            return Some(self.clone());
        }
        let Self::Structured(root) = self else {
            return None;
        };

        let mut current = root;
        for segment in segments {
            current = match (segment, current) {
                (KeySegment::Field(name), Value::Object(map)) => map.get(name)?,
                (KeySegment::Index(index), Value::Array(items)) => items.get(*index)?,
                _ => return None,
            };
        }
        Some(Self::from_json(current.clone()))
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for SecretValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SecretValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<Value> for SecretValue {
    fn from(value: Value) -> Self {
        Self::from_json(value)
    }
}

/// A key path could not be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid key '{key}': {message}")]
pub struct KeyPathError {
    /// The raw key text
    pub key: String,
    /// What is wrong with it
    pub message: String,
}

/// One step of a [`KeyPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySegment {
    /// Object field (`.name` or `["name"]`)
    Field(String),
    /// Array element (`[0]`)
    Index(usize),
}

/// A field name plus an optional sub-path: `password`, `config.db.host`,
/// `hosts[0]`, `labels["app.kubernetes.io/name"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath {
    raw: String,
    segments: Vec<KeySegment>,
}

impl KeyPath {
    /// Parse a key path.
    ///
    /// # Errors
    ///
    /// Returns [`KeyPathError`] for empty keys, empty segments, unterminated or
    /// invalid brackets, and paths that do not start with a field name.
    pub fn parse(raw: &str) -> Result<Self, KeyPathError> {
        let raw = raw.trim();
        let fail = |message: &str| KeyPathError {
            key: raw.to_string(),
            message: message.to_string(),
        };

        if raw.is_empty() {
            return Err(fail("key is empty"));
        }

        let mut segments = Vec::new();
        let mut current = String::new();
        let mut expect_name = true;
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if current.is_empty() && expect_name {
                        return Err(fail("empty segment"));
                    }
                    if !current.is_empty() {
                        segments.push(KeySegment::Field(std::mem::take(&mut current)));
                    }
                    expect_name = true;
                }
                '[' => {
                    if !current.is_empty() {
                        segments.push(KeySegment::Field(std::mem::take(&mut current)));
                    } else if segments.is_empty() {
                        return Err(fail("key must start with a field name"));
                    } else if expect_name {
                        return Err(fail("empty segment"));
                    }

                    let mut inner = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == ']' {
                            closed = true;
                            break;
                        }
                        inner.push(c);
                    }
                    if !closed {
                        return Err(fail("unterminated '['"));
                    }
                    segments.push(Self::bracket_segment(&inner).ok_or_else(|| {
                        fail("brackets must hold an index or a quoted field name")
                    })?);

                    expect_name = false;
                    if let Some(next) = chars.peek()
                        && *next != '.'
                        && *next != '['
                    {
                        return Err(fail("expected '.' or '[' after ']'"));
                    }
                }
                ']' => return Err(fail("unexpected ']'")),
                other => {
                    current.push(other);
                    expect_name = false;
                }
            }
        }

        if !current.is_empty() {
            segments.push(KeySegment::Field(current));
        } else if expect_name {
            return Err(fail("empty segment"));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    fn bracket_segment(inner: &str) -> Option<KeySegment> {
        let inner = inner.trim();
        for quote in ['"', '\''] {
            if let Some(name) = inner
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
            {
                return Some(KeySegment::Field(name.to_string()));
            }
        }
        inner.parse().ok().map(KeySegment::Index)
    }

    /// The key exactly as written.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Parsed segments; the first one is always a field name.
    #[must_use]
    pub fn segments(&self) -> &[KeySegment] {
        &self.segments
    }
}

impl std::fmt::Display for KeyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Flat field map fetched for one source path.
///
/// Immutable once fetched and shared read-only (behind `Arc`) by every
/// placeholder that resolves against the same path.
#[derive(Clone, Default, PartialEq)]
pub struct SecretData {
    fields: IndexMap<String, SecretValue>,
}

impl SecretData {
    /// Create an empty field map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object payload.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Malformed`] if `value` is not a JSON object.
    pub fn from_json_object(path: &str, value: Value) -> Result<Self, FetchError> {
        match value {
            Value::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, SecretValue::from_json(v)))
                .collect()),
            other => Err(FetchError::malformed(
                path,
                format!(
                    "expected an object of fields, got {}",
                    SecretValue::from_json(other).type_name()
                ),
            )),
        }
    }

    /// Insert a field, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<SecretValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Get a field by its exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SecretValue> {
        self.fields.get(name)
    }

    /// Look up a key path.
    ///
    /// The whole key is tried verbatim first, so field names containing dots
    /// (`tls.crt`) win over sub-path interpretation.
    #[must_use]
    pub fn lookup(&self, key: &KeyPath) -> Option<SecretValue> {
        if let Some(value) = self.fields.get(key.raw()) {
            return Some(value.clone());
        }
        let (first, rest) = key.segments().split_first()?;
        let KeySegment::Field(name) = first else {
            return None;
        };
        self.fields.get(name)?.lookup(rest)
    }

    /// Field names in backend order.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, SecretValue)> for SecretData {
    fn from_iter<I: IntoIterator<Item = (String, SecretValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl std::fmt::Debug for SecretData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretData")
            .field("count", &self.fields.len())
            .field("names", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn secret_data_debug_hides_values() {
        let mut data = SecretData::new();
        data.insert("password", "hunter2");

        let debug_output = format!("{data:?}");
        assert!(!debug_output.contains("hunter2"));
        assert!(debug_output.contains("password"));
        assert!(debug_output.contains("count"));
    }

    #[test]
    fn from_json_object_keeps_native_types() {
        let data = SecretData::from_json_object(
            "secret/app",
            json!({"user": "admin", "port": 5432, "enabled": true, "nothing": null}),
        )
        .unwrap();

        assert_eq!(data.len(), 4);
        assert_eq!(data.get("user"), Some(&SecretValue::from("admin")));
        assert_eq!(data.get("port"), Some(&SecretValue::from(5432)));
        assert_eq!(data.get("enabled"), Some(&SecretValue::Bool(true)));
        assert_eq!(data.get("nothing"), Some(&SecretValue::Null));
    }

    #[test]
    fn from_json_object_rejects_scalars() {
        let err = SecretData::from_json_object("secret/app", json!("just a string")).unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
        assert!(err.to_string().contains("got string"));
    }

    #[test]
    fn as_text_renders_each_type() {
        assert_eq!(SecretValue::from("s3cr3t").as_text().as_deref(), Some("s3cr3t"));
        assert_eq!(SecretValue::from(42).as_text().as_deref(), Some("42"));
        assert_eq!(SecretValue::Bool(false).as_text().as_deref(), Some("false"));
        assert_eq!(
            SecretValue::from_json(json!({"a": 1})).as_text().as_deref(),
            Some(r#"{"a":1}"#)
        );
        assert_eq!(SecretValue::Null.as_text(), None);
    }

    #[test]
    fn type_names() {
        assert_eq!(SecretValue::from_json(json!([1])).type_name(), "array");
        assert_eq!(SecretValue::from_json(json!({})).type_name(), "object");
        assert_eq!(SecretValue::from_json(json!(1.5)).type_name(), "number");
    }

    #[test]
    fn key_path_plain() {
        let key = KeyPath::parse("password").unwrap();
        assert_eq!(key.raw(), "password");
        assert_eq!(key.segments(), &[KeySegment::Field("password".into())]);
    }

    #[test]
    fn key_path_dotted_and_bracketed() {
        let key = KeyPath::parse(r#"config.hosts[1]["app.io/name"].x"#).unwrap();
        assert_eq!(
            key.segments(),
            &[
                KeySegment::Field("config".into()),
                KeySegment::Field("hosts".into()),
                KeySegment::Index(1),
                KeySegment::Field("app.io/name".into()),
                KeySegment::Field("x".into()),
            ]
        );
    }

    #[test]
    fn key_path_trims_whitespace() {
        assert_eq!(KeyPath::parse("  user ").unwrap().raw(), "user");
    }

    #[test]
    fn key_path_rejects_malformed() {
        for bad in ["", "   ", "a..b", "a.", ".a", "[0]", "a[", "a]", "a[x]", "a[0]b"] {
            assert!(KeyPath::parse(bad).is_err(), "expected '{bad}' to be rejected");
        }
    }

    #[test]
    fn lookup_prefers_verbatim_field() {
        let mut data = SecretData::new();
        data.insert("tls.crt", "CERT");
        data.insert("tls", SecretValue::from_json(json!({"crt": "OTHER"})));

        let key = KeyPath::parse("tls.crt").unwrap();
        assert_eq!(data.lookup(&key), Some(SecretValue::from("CERT")));
    }

    #[test]
    fn lookup_walks_structured_values() {
        let mut data = SecretData::new();
        data.insert(
            "config",
            SecretValue::from_json(json!({"db": {"hosts": ["a", "b"], "port": 5432}})),
        );

        let host = KeyPath::parse("config.db.hosts[1]").unwrap();
        assert_eq!(data.lookup(&host), Some(SecretValue::from("b")));

        let port = KeyPath::parse("config.db.port").unwrap();
        assert_eq!(data.lookup(&port), Some(SecretValue::from(5432)));

        let missing = KeyPath::parse("config.db.user").unwrap();
        assert_eq!(data.lookup(&missing), None);

        let out_of_range = KeyPath::parse("config.db.hosts[7]").unwrap();
        assert_eq!(data.lookup(&out_of_range), None);
    }

    #[test]
    fn lookup_into_scalar_is_none() {
        let mut data = SecretData::new();
        data.insert("user", "admin");
        let key = KeyPath::parse("user.name").unwrap();
        assert_eq!(data.lookup(&key), None);
    }
}

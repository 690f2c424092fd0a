//! Tree walker
//!
//! Visits every node of a manifest, substitutes placeholders in string leaves
//! and collects every failure instead of stopping at the first one.

use crate::adapter::{Coercion, ResourceAdapter};
use crate::error::{PlaceholderFailure, ResolutionError};
use crate::placeholder::{self, SourceRef};
use crate::resolver::{SecretSources, resolve_scalar};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// One step of a [`FieldPath`]
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

/// Location of a field within a document
///
/// Rendered as `spec.containers[0].env[1].value`; keys that would be
/// ambiguous in that form are quoted: `metadata.annotations["vaultplate.io/path"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// The document root
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Child path for a map key
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.segments.push(PathSegment::Key(key.into()));
        self
    }

    /// Child path for a sequence index
    #[must_use]
    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(PathSegment::Index(index));
        self
    }

    /// Whether this is the document root
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    fn push(&mut self, segment: PathSegment) {
        self.segments.push(segment);
    }

    fn pop(&mut self) {
        self.segments.pop();
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Index(index) => write!(f, "[{index}]")?,
                PathSegment::Key(key) if needs_quoting(key) => write!(f, "[{key:?}]")?,
                PathSegment::Key(key) if i == 0 => f.write_str(key)?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
            }
        }
        Ok(())
    }
}

fn needs_quoting(key: &str) -> bool {
    key.is_empty()
        || key
            .chars()
            .any(|c| matches!(c, '.' | '[' | ']' | '"') || c.is_whitespace())
}

/// Source paths referenced by a document's placeholders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceDemand {
    /// At least one placeholder reads the document's own source path
    pub document: bool,
    /// Inline `path:` sources, sorted
    pub inline: BTreeSet<String>,
}

impl SourceDemand {
    /// Whether no placeholder was found
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.document && self.inline.is_empty()
    }
}

/// Collect the sources referenced by the substitutable parts of `document`.
///
/// Malformed markers are ignored here; they are reported by [`walk_document`].
#[must_use]
pub fn scan_sources(document: &Value, adapter: &dyn ResourceAdapter) -> SourceDemand {
    let mut demand = SourceDemand::default();
    if let Value::Object(map) = document {
        for (key, child) in map {
            if adapter.scope(key).is_some() {
                collect_sources(child, &mut demand);
            }
        }
    }
    demand
}

fn collect_sources(value: &Value, demand: &mut SourceDemand) {
    match value {
        Value::Object(map) => map.values().for_each(|v| collect_sources(v, demand)),
        Value::Array(items) => items.iter().for_each(|v| collect_sources(v, demand)),
        Value::String(scalar) => {
            for marker in placeholder::scan(scalar) {
                match marker.placeholder.map(|p| p.source) {
                    Ok(SourceRef::Document) => demand.document = true,
                    Ok(SourceRef::Inline(path)) => {
                        demand.inline.insert(path);
                    }
                    Err(_) => {}
                }
            }
        }
        _ => {}
    }
}

/// Substitute placeholders in every top-level field the adapter puts in scope.
///
/// Map keys are never rewritten. Fields outside the adapter's scope are left
/// untouched even if they contain marker text.
///
/// # Errors
///
/// Returns one [`ResolutionError`] per failing field, in document order.
pub fn walk_document(
    document: &mut Value,
    adapter: &dyn ResourceAdapter,
    sources: &SecretSources,
) -> Result<(), Vec<ResolutionError>> {
    let mut errors = Vec::new();
    if let Value::Object(map) = document {
        let mut path = FieldPath::root();
        for (key, child) in map.iter_mut() {
            let Some(coercion) = adapter.scope(key) else {
                continue;
            };
            path.push(PathSegment::Key(key.clone()));
            errors.extend(visit(child, &mut path, coercion, sources));
            path.pop();
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Substitute placeholders in `value` and everything below it.
///
/// # Errors
///
/// Returns one [`ResolutionError`] per failing leaf, in traversal order.
pub fn walk(
    value: &mut Value,
    base: &FieldPath,
    coercion: Coercion,
    sources: &SecretSources,
) -> Result<(), Vec<ResolutionError>> {
    let mut path = base.clone();
    let errors = visit(value, &mut path, coercion, sources);
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn visit(
    value: &mut Value,
    path: &mut FieldPath,
    coercion: Coercion,
    sources: &SecretSources,
) -> Vec<ResolutionError> {
    let leaf = match value {
        Value::Object(map) => {
            let mut errors = Vec::new();
            for (key, child) in map.iter_mut() {
                path.push(PathSegment::Key(key.clone()));
                errors.extend(visit(child, path, coercion, sources));
                path.pop();
            }
            return errors;
        }
        Value::Array(items) => {
            let mut errors = Vec::new();
            for (index, child) in items.iter_mut().enumerate() {
                path.push(PathSegment::Index(index));
                errors.extend(visit(child, path, coercion, sources));
                path.pop();
            }
            return errors;
        }
        Value::String(scalar) => resolve_leaf(scalar, coercion, sources),
        Value::Null | Value::Bool(_) | Value::Number(_) => return Vec::new(),
    };

    match leaf {
        Ok(Some(replacement)) => {
            *value = replacement;
            Vec::new()
        }
        Ok(None) => Vec::new(),
        Err(failures) => vec![ResolutionError {
            field_path: path.clone(),
            failures,
        }],
    }
}

fn resolve_leaf(
    scalar: &str,
    coercion: Coercion,
    sources: &SecretSources,
) -> Result<Option<Value>, Vec<PlaceholderFailure>> {
    let Some(resolved) = resolve_scalar(scalar, sources)? else {
        return Ok(None);
    };
    coercion.apply(resolved).map(Some).map_err(|cause| {
        vec![PlaceholderFailure {
            placeholder: scalar.to_string(),
            cause,
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::GenericAdapter;
    use crate::error::ResolutionCause;
    use serde_json::json;
    use std::sync::Arc;
    use vaultplate_secrets::SecretData;

    fn sources() -> SecretSources {
        let data = SecretData::from_json_object(
            "secret/app",
            json!({"username": "admin", "password": "s3cr3t", "replicas": 3, "debug": false}),
        )
        .unwrap();
        SecretSources::for_document("secret/app", Arc::new(data))
    }

    #[test]
    fn test_field_path_display() {
        let path = FieldPath::root()
            .key("spec")
            .key("containers")
            .index(0)
            .key("env")
            .index(1)
            .key("value");
        assert_eq!(path.to_string(), "spec.containers[0].env[1].value");

        let path = FieldPath::root()
            .key("metadata")
            .key("annotations")
            .key("vaultplate.io/path");
        assert_eq!(
            path.to_string(),
            r#"metadata.annotations["vaultplate.io/path"]"#
        );
        assert!(FieldPath::root().is_root());
    }

    #[test]
    fn test_walk_nested_structures() {
        let mut value = json!({
            "containers": [{
                "env": [
                    {"name": "USER", "value": "<username>"},
                    {"name": "DSN", "value": "db://<username>:<password>@host"}
                ],
                "replicas": "<replicas>"
            }]
        });

        walk(&mut value, &FieldPath::root().key("spec"), Coercion::Native, &sources()).unwrap();

        assert_eq!(value["containers"][0]["env"][0]["value"], "admin");
        assert_eq!(value["containers"][0]["env"][1]["value"], "db://admin:s3cr3t@host");
        assert_eq!(value["containers"][0]["replicas"], 3);
    }

    #[test]
    fn test_walk_collects_every_error() {
        let mut value = json!({
            "a": "<missing-one>",
            "b": ["ok <username>", "<missing-two> and <missing-three>"],
            "c": "<password>"
        });

        let errors = walk(&mut value, &FieldPath::root().key("data"), Coercion::Text, &sources())
            .unwrap_err();

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field_path.to_string(), "data.a");
        assert_eq!(errors[1].field_path.to_string(), "data.b[1]");
        assert_eq!(errors[1].failures.len(), 2);

        // Siblings of failing fields are still resolved
        assert_eq!(value["b"][0], "ok admin");
        assert_eq!(value["c"], "s3cr3t");
    }

    #[test]
    fn test_walk_never_rewrites_keys() {
        let mut value = json!({"<username>": "<username>"});
        walk(&mut value, &FieldPath::root(), Coercion::Native, &sources()).unwrap();
        assert_eq!(value, json!({"<username>": "admin"}));
    }

    #[test]
    fn test_text_coercion_stringifies() {
        let mut value = json!({"debug": "<debug>", "replicas": "<replicas>", "n": 7});
        walk(&mut value, &FieldPath::root(), Coercion::Text, &sources()).unwrap();
        assert_eq!(value, json!({"debug": "false", "replicas": "3", "n": 7}));
    }

    #[test]
    fn test_bytes_coercion_encodes() {
        let mut value = json!({"password": "<password>", "literal": "c2VjcmV0"});
        walk(&mut value, &FieldPath::root(), Coercion::Bytes, &sources()).unwrap();
        assert_eq!(value, json!({"password": "czNjcjN0", "literal": "c2VjcmV0"}));
    }

    #[test]
    fn test_walk_document_respects_scope() {
        let mut document = json!({
            "apiVersion": "v1",
            "kind": "<username>",
            "metadata": {"name": "<username>"}
        });
        walk_document(&mut document, &GenericAdapter, &sources()).unwrap();
        assert_eq!(document["kind"], "<username>");
        assert_eq!(document["metadata"]["name"], "admin");
    }

    #[test]
    fn test_scan_sources() {
        let document = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "app"},
            "spec": {
                "a": "<path:secret/b#x>",
                "b": ["<path:secret/a#y>", "<path:secret/b#z>"],
                "c": "<broken#>"
            }
        });
        let demand = scan_sources(&document, &GenericAdapter);
        assert!(!demand.document);
        assert_eq!(
            demand.inline.into_iter().collect::<Vec<_>>(),
            vec!["secret/a".to_string(), "secret/b".to_string()]
        );

        let demand = scan_sources(&json!({"kind": "Pod", "spec": "<x>"}), &GenericAdapter);
        assert!(demand.document);
        assert!(scan_sources(&json!({"kind": "Pod"}), &GenericAdapter).is_empty());
    }

    #[test]
    fn test_coercion_failure_names_the_field() {
        let data = SecretData::from_json_object("p", json!({"nothing": null})).unwrap();
        let sources = SecretSources::for_document("p", Arc::new(data));
        let mut value = json!({"x": "<nothing>"});

        let errors = walk(&mut value, &FieldPath::root().key("data"), Coercion::Text, &sources)
            .unwrap_err();
        assert_eq!(errors[0].field_path.to_string(), "data.x");
        assert!(matches!(
            errors[0].failures[0].cause,
            ResolutionCause::Coercion { .. }
        ));
        assert_eq!(value["x"], "<nothing>");
    }
}

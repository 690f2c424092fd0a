//! Document orchestration
//!
//! Per document: pick the source path and adapter, fetch what the document's
//! placeholders reference through the shared [`SecretCache`], walk the tree
//! and hand the result to the adapter for validation.

use crate::adapter::adapter_for;
use crate::error::{DocumentError, Result};
use crate::resolver::SecretSources;
use crate::walker::{scan_sources, walk_document};
use futures::StreamExt;
use futures::stream;
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;
use vaultplate_secrets::SecretCache;

/// Annotation holding a document-local source path
pub const PATH_ANNOTATION: &str = "vaultplate.io/path";

/// Annotation that excludes a document from resolution
pub const IGNORE_ANNOTATION: &str = "vaultplate.io/ignore";

/// Default number of documents resolved concurrently
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Per-run orchestration settings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Prefix joined with each document's path annotation
    pub path_prefix: Option<String>,
    /// Upper bound on documents resolved at the same time
    pub concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            path_prefix: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// What happened to one input document
#[derive(Debug)]
pub enum DocumentOutcome {
    /// Resolved (or ignored) document, ready to serialize
    Rendered(Value),
    /// Empty document, nothing to emit
    Skipped,
    /// The document failed; it produces no output
    Failed(DocumentError),
}

impl DocumentOutcome {
    /// Whether the document failed
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The rendered document, if any
    #[must_use]
    pub const fn rendered(&self) -> Option<&Value> {
        match self {
            Self::Rendered(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Result<Option<Value>>> for DocumentOutcome {
    fn from(result: Result<Option<Value>>) -> Self {
        match result {
            Ok(Some(value)) => Self::Rendered(value),
            Ok(None) => Self::Skipped,
            Err(err) => Self::Failed(err),
        }
    }
}

/// Resolves documents against one backend session
///
/// # Example
///
/// ```ignore
/// let cache = Arc::new(SecretCache::new(backend, session));
/// let orchestrator = Orchestrator::with_config(cache, OrchestratorConfig {
///     path_prefix: Some("secret/data/team".into()),
///     ..OrchestratorConfig::default()
/// });
/// for outcome in orchestrator.resolve_batch(&documents).await { /* ... */ }
/// ```
#[derive(Debug)]
pub struct Orchestrator {
    cache: Arc<SecretCache>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create an orchestrator with the default configuration
    #[must_use]
    pub fn new(cache: Arc<SecretCache>) -> Self {
        Self::with_config(cache, OrchestratorConfig::default())
    }

    /// Create an orchestrator with an explicit configuration
    #[must_use]
    pub const fn with_config(cache: Arc<SecretCache>, config: OrchestratorConfig) -> Self {
        Self { cache, config }
    }

    /// The shared secret cache
    #[must_use]
    pub fn cache(&self) -> &SecretCache {
        &self.cache
    }

    /// Source path of a document: prefix and path annotation combined
    #[must_use]
    pub fn source_path(&self, document: &Value) -> Option<String> {
        let annotation = annotation(document, PATH_ANNOTATION).and_then(Value::as_str);
        join_source_path(self.config.path_prefix.as_deref(), annotation)
    }

    /// Resolve every document, at most `concurrency` at a time.
    ///
    /// Returns one outcome per input, in input order. A failing document
    /// never affects the others.
    pub async fn resolve_batch(&self, documents: &[Value]) -> Vec<DocumentOutcome> {
        stream::iter(documents.iter().enumerate())
            .map(|(index, document)| {
                self.resolve_document(document)
                    .instrument(tracing::info_span!("document", index))
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    /// Resolve one document.
    pub async fn resolve_document(&self, document: &Value) -> DocumentOutcome {
        let kind = document.get("kind").and_then(Value::as_str).unwrap_or("");
        let name = document
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or("");
        let span = tracing::debug_span!("resolve", kind, name);

        async {
            let outcome = DocumentOutcome::from(self.try_resolve(document).await);
            match &outcome {
                DocumentOutcome::Rendered(_) => tracing::debug!("Document resolved"),
                DocumentOutcome::Skipped => tracing::debug!("Empty document skipped"),
                DocumentOutcome::Failed(err) => tracing::warn!(error = %err, "Document failed"),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn try_resolve(&self, document: &Value) -> Result<Option<Value>> {
        match document {
            Value::Null => return Ok(None),
            Value::Object(map) if map.is_empty() => return Ok(None),
            Value::Object(_) => {}
            _ => {
                return Err(DocumentError::serialization(
                    "resource",
                    "document is not a mapping",
                ));
            }
        }

        if is_ignored(document) {
            tracing::debug!("Document carries {IGNORE_ANNOTATION}, emitting unchanged");
            return Ok(Some(document.clone()));
        }

        let adapter = adapter_for(document.get("kind").and_then(Value::as_str));
        let demand = scan_sources(document, adapter);
        tracing::trace!(
            document_source = demand.document,
            inline_sources = demand.inline.len(),
            "Scanned placeholders"
        );

        let document_source = async {
            if !demand.document {
                return Ok::<_, DocumentError>(None);
            }
            let path = self
                .source_path(document)
                .ok_or(DocumentError::MissingSourcePath)?;
            match self.cache.get_or_fetch(&path).await {
                Ok(data) => Ok(Some((path, data))),
                Err(source) => Err(DocumentError::Fetch { path, source }),
            }
        };
        let inline = self
            .cache
            .get_many(demand.inline.iter().map(String::as_str));
        let (document_source, inline) = futures::join!(document_source, inline);

        let mut sources = match document_source? {
            Some((path, data)) => SecretSources::for_document(path, data),
            None => SecretSources::new(),
        };
        for (path, result) in inline {
            sources = sources.with_inline(path, result);
        }

        let mut resolved = document.clone();
        walk_document(&mut resolved, adapter, &sources)
            .map_err(|errors| DocumentError::Resolution { errors })?;

        adapter.finalize(resolved).map(Some)
    }
}

/// Combine the configured prefix with a document's path annotation.
///
/// A relative annotation is appended to the prefix; an annotation starting
/// with `/` stands on its own. Blank values count as absent.
#[must_use]
pub fn join_source_path(prefix: Option<&str>, annotation: Option<&str>) -> Option<String> {
    let prefix = prefix
        .map(|p| p.trim().trim_end_matches('/'))
        .filter(|p| !p.is_empty());
    let annotation = annotation.map(str::trim).filter(|a| !a.is_empty());

    match (prefix, annotation) {
        (_, Some(absolute)) if absolute.starts_with('/') => {
            Some(absolute.trim_start_matches('/').to_string()).filter(|a| !a.is_empty())
        }
        (Some(prefix), Some(relative)) => Some(format!("{prefix}/{relative}")),
        (None, Some(relative)) => Some(relative.to_string()),
        (Some(prefix), None) => Some(prefix.to_string()),
        (None, None) => None,
    }
}

fn annotation<'a>(document: &'a Value, name: &str) -> Option<&'a Value> {
    document.pointer("/metadata/annotations")?.get(name)
}

fn is_ignored(document: &Value) -> bool {
    match annotation(document, IGNORE_ANNOTATION) {
        Some(Value::String(flag)) => flag.trim().eq_ignore_ascii_case("true"),
        Some(Value::Bool(flag)) => *flag,
        _ => false,
    }
}

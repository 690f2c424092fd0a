//! Placeholder resolution against fetched secret data
//!
//! Pure and synchronous: every source path a document needs is fetched
//! before resolution starts, so nothing here waits on I/O.

use crate::error::{PlaceholderFailure, ResolutionCause};
use crate::placeholder::{self, Placeholder, SourceRef};
use std::collections::HashMap;
use std::sync::Arc;
use vaultplate_secrets::{FetchError, SecretData, SecretValue};

/// Result of substituting the markers of one scalar
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// The scalar was exactly one marker; the value keeps its native type
    Native(SecretValue),
    /// Markers embedded in literal text, substituted textually
    Text(String),
}

/// Secret data available to one document
///
/// Holds the document's own source path (if any) and the outcome of every
/// inline `path:` source the document references.
#[derive(Debug, Clone, Default)]
pub struct SecretSources {
    document: Option<(String, Arc<SecretData>)>,
    inline: HashMap<String, Result<Arc<SecretData>, FetchError>>,
}

impl SecretSources {
    /// No data at all
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sources with the document's own data
    #[must_use]
    pub fn for_document(path: impl Into<String>, data: Arc<SecretData>) -> Self {
        Self {
            document: Some((path.into(), data)),
            inline: HashMap::new(),
        }
    }

    /// Record the outcome of fetching an inline source path
    #[must_use]
    pub fn with_inline(
        mut self,
        path: impl Into<String>,
        result: Result<Arc<SecretData>, FetchError>,
    ) -> Self {
        self.inline.insert(path.into(), result);
        self
    }

    /// Look up one placeholder.
    ///
    /// # Errors
    ///
    /// Returns the reason the value is unavailable: missing key, failed or
    /// unknown inline source, or no document source.
    pub fn lookup(&self, placeholder: &Placeholder) -> Result<SecretValue, ResolutionCause> {
        let (path, data) = match &placeholder.source {
            SourceRef::Document => {
                let (path, data) = self
                    .document
                    .as_ref()
                    .ok_or(ResolutionCause::NoSourcePath)?;
                (path.as_str(), data)
            }
            SourceRef::Inline(path) => {
                let data = self
                    .inline
                    .get(path)
                    .ok_or_else(|| {
                        ResolutionCause::Fetch(FetchError::backend(path, "source was not fetched"))
                    })?
                    .as_ref()
                    .map_err(|e| ResolutionCause::Fetch(e.clone()))?;
                (path.as_str(), data)
            }
        };

        data.lookup(&placeholder.key)
            .ok_or_else(|| ResolutionCause::KeyNotFound {
                key: placeholder.key.raw().to_string(),
                path: path.to_string(),
            })
    }
}

/// Substitute every marker in `scalar`.
///
/// Returns `Ok(None)` when the scalar holds no marker. A scalar that is
/// exactly one marker resolves to [`Resolved::Native`]; otherwise markers are
/// replaced by the textual form of their values. Resolved values are inserted
/// as is and never scanned again.
///
/// # Errors
///
/// Returns every failing marker of the scalar, in order.
pub fn resolve_scalar(
    scalar: &str,
    sources: &SecretSources,
) -> Result<Option<Resolved>, Vec<PlaceholderFailure>> {
    let markers = placeholder::scan(scalar);
    if markers.is_empty() {
        return Ok(None);
    }

    let mut failures = Vec::new();
    let lookup = |marker: &placeholder::Marker<'_>| {
        marker
            .placeholder
            .as_ref()
            .map_err(Clone::clone)
            .and_then(|p| sources.lookup(p))
    };

    if let [marker] = markers.as_slice()
        && marker.is_whole_value(scalar)
    {
        return match lookup(marker) {
            Ok(value) => Ok(Some(Resolved::Native(value))),
            Err(cause) => Err(vec![PlaceholderFailure {
                placeholder: marker.text.to_string(),
                cause,
            }]),
        };
    }

    let mut output = String::with_capacity(scalar.len());
    let mut cursor = 0;
    for marker in &markers {
        output.push_str(&scalar[cursor..marker.range.start]);
        cursor = marker.range.end;

        match lookup(marker).and_then(|value| render_text(&value)) {
            Ok(text) => output.push_str(&text),
            Err(cause) => failures.push(PlaceholderFailure {
                placeholder: marker.text.to_string(),
                cause,
            }),
        }
    }
    output.push_str(&scalar[cursor..]);

    if failures.is_empty() {
        Ok(Some(Resolved::Text(output)))
    } else {
        Err(failures)
    }
}

/// Textual form of a value for substitution into text.
///
/// # Errors
///
/// `null` has no textual form and yields [`ResolutionCause::Coercion`].
pub fn render_text(value: &SecretValue) -> Result<String, ResolutionCause> {
    value.as_text().ok_or_else(|| ResolutionCause::Coercion {
        type_name: value.type_name(),
        message: "null cannot be rendered as text".to_string(),
    })
}

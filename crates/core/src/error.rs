//! Error types for document resolution

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use crate::walker::FieldPath;
use miette::Diagnostic;
use thiserror::Error;
use vaultplate_secrets::FetchError;

/// Why a single placeholder could not be substituted
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolutionCause {
    /// The key is absent from the fetched secret data
    #[error("key '{key}' not found at '{path}'")]
    KeyNotFound {
        /// Key as written in the placeholder
        key: String,
        /// Source path that was searched
        path: String,
    },

    /// The marker does not follow the placeholder grammar
    #[error("malformed placeholder: {message}")]
    Malformed {
        /// What is wrong with it
        message: String,
    },

    /// The resolved value cannot be written in the form the resource kind needs
    #[error("cannot coerce {type_name} value: {message}")]
    Coercion {
        /// Type of the resolved value
        type_name: &'static str,
        /// Why it cannot be coerced
        message: String,
    },

    /// The inline source path of the placeholder could not be fetched
    #[error("{0}")]
    Fetch(FetchError),

    /// The placeholder uses the document's source path but none is configured
    #[error("no source path configured")]
    NoSourcePath,
}

impl ResolutionCause {
    /// Create a malformed-placeholder cause
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// One failing placeholder inside a field
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderFailure {
    /// Marker text, including the delimiters
    pub placeholder: String,
    /// Why it failed
    pub cause: ResolutionCause,
}

/// Every failing placeholder of one field
///
/// A field that holds several broken markers produces a single error that
/// lists all of them.
#[derive(Debug, Clone, Error, Diagnostic, PartialEq)]
#[error("{field_path}: {}", format_failures(.failures))]
#[diagnostic(code(vaultplate::resolution))]
pub struct ResolutionError {
    /// Location of the field in the document
    pub field_path: FieldPath,
    /// Failing placeholders, in the order they appear in the field
    pub failures: Vec<PlaceholderFailure>,
}

fn format_failures(failures: &[PlaceholderFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.placeholder, f.cause))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A document could not be resolved
///
/// Scoped to one document: other documents of the same batch are unaffected.
#[derive(Debug, Error, Diagnostic)]
pub enum DocumentError {
    /// The document's source path could not be fetched
    #[error("Failed to fetch secrets for the document")]
    #[diagnostic(
        code(vaultplate::document::fetch),
        help("Check the source path and that the session may read it")
    )]
    Fetch {
        /// Source path of the document
        path: String,
        /// Backend failure
        #[source]
        source: FetchError,
    },

    /// The document uses placeholders but has no source path
    #[error("Document has placeholders but no source path")]
    #[diagnostic(
        code(vaultplate::document::missing_path),
        help("Set VAULTPLATE_PATH_PREFIX or add the vaultplate.io/path annotation")
    )]
    MissingSourcePath,

    /// One or more fields could not be resolved
    #[error("{} field(s) could not be resolved", errors.len())]
    #[diagnostic(code(vaultplate::document::resolution))]
    Resolution {
        /// One entry per failing field, in document order
        #[related]
        errors: Vec<ResolutionError>,
    },

    /// The resolved document does not match its kind's schema
    #[error("Invalid {kind}: {message}")]
    #[diagnostic(
        code(vaultplate::document::serialization),
        help("Placeholders must resolve to values the resource kind accepts")
    )]
    Serialization {
        /// Resource kind
        kind: String,
        /// Schema violation
        message: String,
    },
}

impl DocumentError {
    /// Create a serialization error
    #[must_use]
    pub fn serialization(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Serialization {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Field-level errors, empty for document-level failures
    #[must_use]
    pub fn resolution_errors(&self) -> &[ResolutionError] {
        match self {
            Self::Resolution { errors } => errors,
            _ => &[],
        }
    }
}

/// Result type for document resolution
pub type Result<T> = std::result::Result<T, DocumentError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn field(path: &str) -> FieldPath {
        path.split('.').fold(FieldPath::root(), |p, key| p.key(key))
    }

    #[test]
    fn test_resolution_error_lists_every_marker() {
        let error = ResolutionError {
            field_path: field("data.url"),
            failures: vec![
                PlaceholderFailure {
                    placeholder: "<user>".to_string(),
                    cause: ResolutionCause::KeyNotFound {
                        key: "user".to_string(),
                        path: "secret/app".to_string(),
                    },
                },
                PlaceholderFailure {
                    placeholder: "< >".to_string(),
                    cause: ResolutionCause::malformed("placeholder is empty"),
                },
            ],
        };

        assert_eq!(
            error.to_string(),
            "data.url: <user> (key 'user' not found at 'secret/app'), \
             < > (malformed placeholder: placeholder is empty)"
        );
    }

    #[test]
    fn test_fetch_cause_display() {
        let cause = ResolutionCause::Fetch(FetchError::NotFound {
            path: "secret/other".to_string(),
        });
        assert_eq!(cause.to_string(), "No secret found at 'secret/other'");
    }

    #[test]
    fn test_document_error_resolution_count() {
        let errors = vec![ResolutionError {
            field_path: field("data.password"),
            failures: vec![],
        }];
        let error = DocumentError::Resolution { errors };
        assert_eq!(error.to_string(), "1 field(s) could not be resolved");
        assert_eq!(error.resolution_errors().len(), 1);
    }

    #[test]
    fn test_document_error_codes() {
        use miette::Diagnostic;

        let error = DocumentError::MissingSourcePath;
        assert_eq!(
            error.code().map(|c| c.to_string()),
            Some("vaultplate::document::missing_path".to_string())
        );
        assert!(error.help().is_some());
        assert!(error.resolution_errors().is_empty());

        let error = DocumentError::serialization("Secret", "data.password is not valid base64");
        assert_eq!(
            error.to_string(),
            "Invalid Secret: data.password is not valid base64"
        );
    }
}

//! Placeholder marker grammar
//!
//! A marker is `<` content `>` where the content holds no `<` or `>`. The
//! content is either a key looked up in the document's source path, or
//! `path:<source path>#<key>` naming the source path inline. Keys may carry
//! a sub-path into structured values (`config.db.host`, `hosts[0]`).

use crate::error::ResolutionCause;
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;
use vaultplate_secrets::KeyPath;

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"<([^<>]+)>").expect("marker pattern is valid")
});

const INLINE_PREFIX: &str = "path:";

/// Where a placeholder's value comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceRef {
    /// The source path of the surrounding document
    Document,
    /// An explicit source path given inside the marker
    Inline(String),
}

/// A well-formed placeholder
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    /// Source path to read from
    pub source: SourceRef,
    /// Key (and optional sub-path) within the secret data
    pub key: KeyPath,
}

impl Placeholder {
    /// Parse the content between the delimiters.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionCause::Malformed`] for blank keys, empty inline
    /// paths, stray `#` and invalid sub-paths.
    pub fn parse(content: &str) -> Result<Self, ResolutionCause> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ResolutionCause::malformed("placeholder is empty"));
        }

        let (source, key) = if let Some(inline) = content.strip_prefix(INLINE_PREFIX) {
            let (path, key) = inline.split_once('#').ok_or_else(|| {
                ResolutionCause::malformed("expected 'path:<source path>#<key>'")
            })?;
            let path = path.trim();
            if path.is_empty() {
                return Err(ResolutionCause::malformed("source path is empty"));
            }
            (SourceRef::Inline(path.to_string()), key)
        } else {
            (SourceRef::Document, content)
        };

        if key.contains('#') {
            return Err(ResolutionCause::malformed(format!(
                "unexpected '#' in key '{}'",
                key.trim()
            )));
        }
        if key.trim().chars().any(char::is_whitespace) {
            return Err(ResolutionCause::malformed(format!(
                "key '{}' contains whitespace",
                key.trim()
            )));
        }

        let key = KeyPath::parse(key).map_err(|e| ResolutionCause::malformed(e.to_string()))?;
        Ok(Self { source, key })
    }
}

/// One marker occurrence inside a scalar
#[derive(Debug, Clone, PartialEq)]
pub struct Marker<'a> {
    /// Byte range of the whole marker, delimiters included
    pub range: Range<usize>,
    /// Marker text, delimiters included
    pub text: &'a str,
    /// Parsed placeholder, or why it is malformed
    pub placeholder: Result<Placeholder, ResolutionCause>,
}

impl Marker<'_> {
    /// Whether this marker spans the whole of `scalar`
    #[must_use]
    pub fn is_whole_value(&self, scalar: &str) -> bool {
        self.range.start == 0 && self.range.end == scalar.len()
    }
}

/// Find every marker in `scalar`, left to right.
///
/// A marker touching an extra `<` or `>` is reported as malformed.
#[must_use]
pub fn scan(scalar: &str) -> Vec<Marker<'_>> {
    MARKER
        .captures_iter(scalar)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let content = caps.get(1)?;
            // `<<key>>` would leave `<value>` behind, which scans as a marker again
            let wrapped = scalar[..whole.start()].ends_with('<')
                || scalar[whole.end()..].starts_with('>');
            let placeholder = if wrapped {
                Err(ResolutionCause::malformed(
                    "marker is directly wrapped in another '<' or '>'",
                ))
            } else {
                Placeholder::parse(content.as_str())
            };
            Some(Marker {
                range: whole.range(),
                text: whole.as_str(),
                placeholder,
            })
        })
        .collect()
}

/// Whether `scalar` contains at least one marker
#[must_use]
pub fn contains_marker(scalar: &str) -> bool {
    MARKER.is_match(scalar)
}

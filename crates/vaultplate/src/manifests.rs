//! Manifest input and output
//!
//! Input is a single YAML file or a directory searched recursively for
//! `*.yaml`/`*.yml`; each file may hold several `---`-separated documents.

use crate::cli::CliError;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One YAML document and where it came from
#[derive(Debug, Clone)]
pub struct Manifest {
    /// File the document was read from
    pub file: PathBuf,
    /// Position of the document inside its file
    pub position: usize,
    /// Parsed document
    pub document: Value,
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
}

/// Manifest files under `path`, sorted
///
/// A file path is returned as is, whatever its extension.
///
/// # Errors
///
/// Returns a configuration error if `path` does not exist, cannot be walked
/// or holds no YAML files.
pub fn collect_files(path: &Path) -> Result<Vec<PathBuf>, CliError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(CliError::config(format!(
            "Manifest path {} does not exist",
            path.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| CliError::config(format!("Cannot read manifests: {e}")))?;
        if entry.file_type().is_file() && is_yaml(entry.path()) {
            files.push(entry.into_path());
        }
    }
    if files.is_empty() {
        return Err(CliError::config(format!(
            "No YAML files were found in {}",
            path.display()
        )));
    }
    tracing::debug!(root = %path.display(), files = files.len(), "Collected manifest files");
    Ok(files)
}

/// Split a multi-document YAML stream
///
/// # Errors
///
/// Returns the YAML error of the first document that fails to parse.
pub fn parse_documents(text: &str) -> Result<Vec<Value>, serde_yaml::Error> {
    serde_yaml::Deserializer::from_str(text)
        .map(Value::deserialize)
        .collect()
}

/// Read every document under `path`, in file order then document order
///
/// # Errors
///
/// Returns a configuration error for unreadable files or invalid YAML.
pub fn load(path: &Path) -> Result<Vec<Manifest>, CliError> {
    let mut manifests = Vec::new();
    for file in collect_files(path)? {
        let text = std::fs::read_to_string(&file)
            .map_err(|e| CliError::config(format!("Cannot read {}: {e}", file.display())))?;
        let documents = parse_documents(&text).map_err(|e| {
            CliError::config_with_help(
                format!("Invalid YAML in {}: {e}", file.display()),
                "Manifests must be valid YAML documents",
            )
        })?;
        manifests.extend(
            documents
                .into_iter()
                .enumerate()
                .map(|(position, document)| Manifest {
                    file: file.clone(),
                    position,
                    document,
                }),
        );
    }
    Ok(manifests)
}

/// Serialize a resolved document followed by a `---` separator
///
/// # Errors
///
/// Returns the serializer error if the value cannot be written as YAML.
pub fn render(document: &Value) -> Result<String, serde_yaml::Error> {
    let mut out = serde_yaml::to_string(document)?;
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("---\n");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_multiple_documents() {
        let docs = parse_documents(
            "apiVersion: v1\nkind: Secret\n---\napiVersion: v1\nkind: ConfigMap\n",
        )
        .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["kind"], "Secret");
        assert_eq!(docs[1]["kind"], "ConfigMap");
    }

    #[test]
    fn test_parse_keeps_key_order() {
        let docs = parse_documents("kind: ConfigMap\napiVersion: v1\nmetadata:\n  name: x\n")
            .unwrap();
        let keys: Vec<_> = docs[0].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["kind", "apiVersion", "metadata"]);
    }

    #[test]
    fn test_parse_invalid_yaml() {
        assert!(parse_documents("key: [unclosed").is_err());
    }

    #[test]
    fn test_render_appends_separator() {
        let out = render(&json!({"kind": "ConfigMap", "data": {"a": "b"}})).unwrap();
        assert!(out.starts_with("kind: ConfigMap\n"));
        assert!(out.ends_with("---\n"));
        let reparsed = parse_documents(&out).unwrap();
        assert_eq!(reparsed[0]["data"]["a"], "b");
    }

    #[test]
    fn test_collect_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.yaml"), "a: 1").unwrap();
        std::fs::write(dir.path().join("a.yml"), "a: 1").unwrap();
        std::fs::write(dir.path().join("nested/c.yaml"), "a: 1").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip").unwrap();

        let files = collect_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.yml"),
                PathBuf::from("b.yaml"),
                PathBuf::from("nested/c.yaml"),
            ]
        );
    }

    #[test]
    fn test_collect_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip").unwrap();
        let err = collect_files(dir.path()).unwrap_err();
        assert!(err.to_string().contains("No YAML files"));
    }

    #[test]
    fn test_collect_missing_path() {
        let err = collect_files(Path::new("/nonexistent/manifests")).unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
    }

    #[test]
    fn test_load_tracks_origin() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.yaml");
        std::fs::write(&file, "kind: A\n---\nkind: B\n").unwrap();

        let manifests = load(dir.path()).unwrap();
        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[1].file, file);
        assert_eq!(manifests[1].position, 1);
        assert_eq!(manifests[1].document["kind"], "B");
    }
}

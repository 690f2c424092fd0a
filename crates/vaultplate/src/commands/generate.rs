//! `vaultplate generate`: resolve manifests and print them

use crate::cli::CliError;
use crate::config::{Config, build_backend};
use crate::manifests::{self, Manifest};
use crate::session_store::SessionStore;
use serde_json::Value;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vaultplate_core::{DocumentError, DocumentOutcome, Orchestrator, OrchestratorConfig};
use vaultplate_secrets::{
    BackendClient, CacheConfig, SecretCache, Session, establish_session,
};

/// Where a document came from, for error reports
#[derive(Debug, Clone)]
struct Origin {
    file: PathBuf,
    position: usize,
}

/// Counts of one run
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    /// Documents written to stdout
    pub rendered: usize,
    /// Empty documents
    pub skipped: usize,
    /// Documents reported on stderr
    pub failed: usize,
}

/// Resolve every manifest under `path` and write the results
///
/// # Errors
///
/// - configuration errors for bad settings or unreadable manifests
/// - authentication errors when no session can be established
/// - [`CliError::Failed`] when at least one document failed
pub async fn execute(path: &Path, config_path: Option<&Path>) -> Result<(), CliError> {
    let config = Config::load(config_path)?;
    let loaded = manifests::load(path)?;
    tracing::info!(documents = loaded.len(), "Loaded manifests");

    let backend = build_backend(&config).await?;
    let store = default_session_store();
    let session = open_session(backend.as_ref(), store.as_ref()).await?;

    let cache = Arc::new(SecretCache::with_config(
        backend,
        session,
        CacheConfig::with_timeout(config.fetch_timeout),
    ));
    let orchestrator = Orchestrator::with_config(
        Arc::clone(&cache),
        OrchestratorConfig {
            path_prefix: config.path_prefix.clone(),
            concurrency: config.concurrency,
        },
    );

    let (origins, documents): (Vec<Origin>, Vec<Value>) = loaded
        .into_iter()
        .map(|Manifest { file, position, document }| (Origin { file, position }, document))
        .unzip();

    let outcomes = orchestrator.resolve_batch(&documents).await;
    tracing::info!(fetches = cache.fetch_count(), "Resolution finished");

    let summary = write_outcomes(
        &mut io::stdout().lock(),
        &mut io::stderr().lock(),
        &origins,
        &documents,
        &outcomes,
    )
    .map_err(|e| CliError::other(format!("Cannot write output: {e}")))?;

    if summary.failed > 0 {
        return Err(CliError::Failed {
            failed: summary.failed,
            total: outcomes.len(),
        });
    }
    Ok(())
}

/// Establish a session, reusing the stored one when the backend still accepts it
///
/// Only sessions from backends that report a
/// [`session_scope`](BackendClient::session_scope) are loaded and saved.
async fn open_session(
    backend: &dyn BackendClient,
    store: Option<&SessionStore>,
) -> Result<Session, CliError> {
    let Some((store, scope)) = store.zip(backend.session_scope()) else {
        return Ok(establish_session(backend, None).await?);
    };

    let existing = store
        .load(backend.provider_name(), &scope)
        .await
        .unwrap_or_else(|err| {
            tracing::warn!(error = %err, "Ignoring stored session");
            None
        });

    let session = establish_session(backend, existing).await?;
    store.save_best_effort(&session, &scope).await;
    Ok(session)
}

fn default_session_store() -> Option<SessionStore> {
    SessionStore::default_location()
        .inspect_err(|err| tracing::warn!(error = %err, "Session persistence disabled"))
        .ok()
}

/// Write rendered documents to `out` and failures to `err`, in input order
fn write_outcomes(
    out: &mut impl Write,
    err: &mut impl Write,
    origins: &[Origin],
    documents: &[Value],
    outcomes: &[DocumentOutcome],
) -> io::Result<Summary> {
    let mut summary = Summary::default();
    for (index, outcome) in outcomes.iter().enumerate() {
        match outcome {
            DocumentOutcome::Rendered(document) => {
                let text = manifests::render(document).map_err(io::Error::other)?;
                out.write_all(text.as_bytes())?;
                summary.rendered += 1;
            }
            DocumentOutcome::Skipped => summary.skipped += 1,
            DocumentOutcome::Failed(error) => {
                let report = format_failure(index, &origins[index], &documents[index], error);
                err.write_all(report.as_bytes())?;
                summary.failed += 1;
            }
        }
    }
    out.flush()?;
    err.flush()?;
    Ok(summary)
}

/// Human-readable report of one failed document
fn format_failure(index: usize, origin: &Origin, document: &Value, error: &DocumentError) -> String {
    let kind = document.get("kind").and_then(Value::as_str).unwrap_or("?");
    let name = document
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or("?");

    let mut report = format!(
        "error: document {index} ({}#{}) {kind}/{name}: {error}",
        origin.file.display(),
        origin.position
    );
    if let DocumentError::Fetch { source, .. } = error {
        report.push_str(&format!(": {source}"));
    }
    report.push('\n');
    for field in error.resolution_errors() {
        report.push_str(&format!("  {field}\n"));
    }
    report
}

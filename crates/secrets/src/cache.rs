//! Per-run secret cache
//!
//! Memoizes backend responses keyed by source path:
//! - exactly one backend call per path, even when many documents ask concurrently
//! - failures are cached as well, so a broken path is not retried within a run
//! - every backend call is bounded by [`CacheConfig::fetch_timeout`]

use crate::{BackendClient, FetchError, SecretData, Session};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::Instrument;

/// Default per-call backend timeout
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one fetch, shared by every caller for the same path
type FetchResult = Result<Arc<SecretData>, FetchError>;

/// Configuration for the secret cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound for a single backend call.
    pub fetch_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl CacheConfig {
    /// Create a config with the given fetch timeout.
    #[must_use]
    pub const fn with_timeout(fetch_timeout: Duration) -> Self {
        Self { fetch_timeout }
    }
}

/// Concurrency-safe, read-mostly map from source path to fetched [`SecretData`].
///
/// Lifetime is one run; nothing is persisted.
///
/// # Example
///
/// ```ignore
/// let cache = SecretCache::new(backend, session);
/// let data = cache.get_or_fetch("secret/data/app").await?;
/// assert_eq!(cache.fetch_count(), 1);
/// ```
pub struct SecretCache {
    backend: Arc<dyn BackendClient>,
    session: Session,
    config: CacheConfig,
    /// Source path -> fetch slot (initialized once)
    entries: DashMap<String, Arc<OnceCell<FetchResult>>>,
    /// Number of backend calls made
    fetches: AtomicUsize,
}

impl SecretCache {
    /// Create a cache with the default configuration.
    #[must_use]
    pub fn new(backend: Arc<dyn BackendClient>, session: Session) -> Self {
        Self::with_config(backend, session, CacheConfig::default())
    }

    /// Create a cache with an explicit configuration.
    #[must_use]
    pub fn with_config(
        backend: Arc<dyn BackendClient>,
        session: Session,
        config: CacheConfig,
    ) -> Self {
        Self {
            backend,
            session,
            config,
            entries: DashMap::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Return the data for `path`, fetching it on first use.
    ///
    /// # Errors
    ///
    /// Returns the (cached) [`FetchError`] if the backend call failed or timed out.
    pub async fn get_or_fetch(&self, path: &str) -> FetchResult {
        // Clone the slot out so no map guard is held across the await
        let slot = self.entries.entry(path.to_string()).or_default().clone();
        slot.get_or_init(|| self.fetch(path)).await.clone()
    }

    /// Fetch several paths concurrently.
    ///
    /// Results are returned in the order of `paths`.
    pub async fn get_many<'p, I>(&self, paths: I) -> Vec<(&'p str, FetchResult)>
    where
        I: IntoIterator<Item = &'p str>,
    {
        join_all(paths.into_iter().map(|path| async move {
            let result = self.get_or_fetch(path).await;
            (path, result)
        }))
        .await
    }

    async fn fetch(&self, path: &str) -> FetchResult {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let span = tracing::debug_span!(
            "fetch",
            provider = self.backend.provider_name(),
            path = %path,
        );

        async {
            let call = self.backend.fetch_secret_data(&self.session, path);
            match tokio::time::timeout(self.config.fetch_timeout, call).await {
                Ok(Ok(data)) => {
                    tracing::debug!(fields = data.len(), "Fetched secret data");
                    Ok(Arc::new(data))
                }
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "Secret fetch failed");
                    Err(err)
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_secs = self.config.fetch_timeout.as_secs(),
                        "Secret fetch timed out"
                    );
                    Err(FetchError::Timeout {
                        path: path.to_string(),
                        seconds: self.config.fetch_timeout.as_secs(),
                    })
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Number of backend calls made so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Source paths that have been requested, in no particular order.
    #[must_use]
    pub fn cached_paths(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// The session used for every fetch.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Provider name of the underlying backend.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.backend.provider_name()
    }
}

impl std::fmt::Debug for SecretCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCache")
            .field("provider", &self.backend.provider_name())
            .field("paths", &self.entries.len())
            .field("fetches", &self.fetch_count())
            .field("config", &self.config)
            .finish()
    }
}

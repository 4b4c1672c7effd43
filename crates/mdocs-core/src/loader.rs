//! Document loading with caching, request coalescing and retries.
//!
//! [`DocumentLoader::load_document`] resolves content in this order:
//!
//! 1. the persistent cache
//! 2. an in-flight load for the same document id, shared by every caller
//! 3. inline content, or a fetch through the source strategy under
//!    [`with_retry`]
//!
//! Every public operation runs inside the loader's [`ErrorBoundary`], so
//! failures surface as fallback values and handler reports, never as `Err`.

use crate::boundary::{BoundaryContext, ErrorBoundary};
use crate::config::SiteConfig;
use crate::fetcher::{GithubPath, SourceFetcher};
use crate::persistent::{CacheStats, Persistence, PersistentCache};
use crate::retry::{RetryConfig, RetryConfigUpdate, with_retry};
use crate::store::KeyValueStore;
use crate::{Document, DocumentSource, Error, Result, SourceKind};
use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Documents loaded concurrently per preload batch.
pub const PRELOAD_CONCURRENCY: usize = 3;

type SharedLoad = Shared<BoxFuture<'static, Result<String>>>;
type InFlight = Arc<Mutex<HashMap<String, InFlightLoad>>>;

struct InFlightLoad {
    token: u64,
    load: SharedLoad,
}

/// Outcome of [`DocumentLoader::preload_documents`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreloadReport {
    /// Freshly loaded and cached.
    pub loaded: Vec<String>,
    /// Already cached before the preload.
    pub skipped: Vec<String>,
    /// Load failed; the error went to the boundary handler.
    pub failed: Vec<String>,
    /// Not part of the source's document list.
    pub missing: Vec<String>,
}

/// Loads document content from a [`DocumentSource`].
pub struct DocumentLoader {
    source: Arc<DocumentSource>,
    fetcher: SourceFetcher,
    cache: Arc<Mutex<PersistentCache>>,
    retry: RwLock<RetryConfig>,
    in_flight: InFlight,
    next_token: AtomicU64,
    boundary: ErrorBoundary,
}

impl fmt::Debug for DocumentLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentLoader")
            .field("source", &self.source.kind)
            .field("documents", &self.source.documents.len())
            .field("in_flight", &self.in_flight_count())
            .finish_non_exhaustive()
    }
}

impl DocumentLoader {
    /// Loader with the default retry policy and a logging boundary.
    pub fn new(source: DocumentSource, fetcher: SourceFetcher, cache: PersistentCache) -> Self {
        Self {
            source: Arc::new(source),
            fetcher,
            cache: Arc::new(Mutex::new(cache)),
            retry: RwLock::new(RetryConfig::default()),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_token: AtomicU64::new(0),
            boundary: ErrorBoundary::default(),
        }
    }

    /// Build a loader from a site configuration.
    ///
    /// `store` is only used when `[cache] persist` is enabled.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed.
    pub fn from_config(config: &SiteConfig, store: Option<Arc<dyn KeyValueStore>>) -> Result<Self> {
        let fetcher = SourceFetcher::from_settings(&config.http)?;
        let store = store.filter(|_| config.cache.persist);
        let cache = PersistentCache::new(config.cache.capacity, config.cache.storage_key.clone(), store);
        Ok(Self::new(config.source.clone(), fetcher, cache).with_retry_config(config.retry.clone()))
    }

    #[must_use]
    pub fn with_retry_config(self, retry: RetryConfig) -> Self {
        Self {
            retry: RwLock::new(retry),
            ..self
        }
    }

    #[must_use]
    pub fn with_boundary(self, boundary: ErrorBoundary) -> Self {
        Self { boundary, ..self }
    }

    pub fn source(&self) -> &DocumentSource {
        &self.source
    }

    pub const fn boundary(&self) -> &ErrorBoundary {
        &self.boundary
    }

    /// Validate the source and return its document list.
    ///
    /// Nothing is fetched. An invalid source yields an empty list.
    pub async fn load_all(&self) -> Vec<Document> {
        self.boundary
            .execute(
                || async {
                    self.validate_source()?;
                    Ok::<_, Error>(self.source.documents.clone())
                },
                Vec::new,
                BoundaryContext::new("load_all"),
            )
            .await
    }

    /// Check the source configuration.
    ///
    /// Returns the non-fatal warnings, which are also logged.
    ///
    /// # Errors
    ///
    /// Fails with `INVALID_CONFIGURATION` when the document list is empty.
    pub fn validate_source(&self) -> Result<Vec<String>> {
        let source = &self.source;
        if source.documents.is_empty() {
            return Err(Error::invalid_config(format!(
                "{} source has no documents",
                source.kind.as_str()
            )));
        }

        let mut warnings = Vec::new();
        if source.kind == SourceKind::Url && source.base_url.is_none() {
            warnings.push("url source has no base_url; document files must be absolute URLs".to_string());
        }

        let mut seen = HashSet::new();
        for doc in &source.documents {
            if !seen.insert(doc.id.as_str()) {
                warnings.push(format!("duplicate document id '{}'", doc.id));
            }
            match source.kind {
                SourceKind::Content if doc.content.is_none() => {
                    warnings.push(format!("document '{}' has no inline content", doc.id));
                },
                SourceKind::Local | SourceKind::Url | SourceKind::Github
                    if doc.content.is_none() && doc.file.is_none() =>
                {
                    warnings.push(format!("document '{}' has neither file nor content", doc.id));
                },
                SourceKind::Github if doc.content.is_none() => {
                    if let Some(Err(e)) = doc.file.as_deref().map(GithubPath::parse) {
                        warnings.push(format!("document '{}': {e}", doc.id));
                    }
                },
                _ => {},
            }
        }

        for warning in &warnings {
            warn!("{warning}");
        }
        Ok(warnings)
    }

    /// Markdown for `doc`, or an empty string if it cannot be loaded.
    pub async fn load_document(&self, doc: &Document) -> String {
        self.boundary
            .execute(
                || self.try_load_document(doc),
                String::new,
                BoundaryContext::new("load_document").document(&doc.id),
            )
            .await
    }

    /// Markdown for `doc`, propagating the failure instead of falling back.
    pub async fn try_load_document(&self, doc: &Document) -> Result<String> {
        let cached = self.lock_cache().get(&doc.id);
        if let Some(content) = cached {
            debug!("Cache hit for document '{}'", doc.id);
            return Ok(content);
        }

        let load = {
            let mut in_flight = lock(&self.in_flight);
            // A load may have finished between the cache check and taking the lock.
            if let Some(content) = self.lock_cache().get(&doc.id) {
                return Ok(content);
            }
            if let Some(existing) = in_flight.get(&doc.id) {
                debug!("Joining in-flight load for document '{}'", doc.id);
                existing.load.clone()
            } else {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                let load = self.start_load(doc.clone(), token);
                in_flight.insert(
                    doc.id.clone(),
                    InFlightLoad {
                        token,
                        load: load.clone(),
                    },
                );
                load
            }
        };

        load.await
    }

    fn start_load(&self, doc: Document, token: u64) -> SharedLoad {
        let source = Arc::clone(&self.source);
        let fetcher = self.fetcher.clone();
        let cache = Arc::clone(&self.cache);
        let retry = self.retry_config();
        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            id: doc.id.clone(),
            token,
        };

        // Runs to completion even when every waiter is dropped.
        let task = tokio::spawn(async move {
            let _guard = guard;
            let content = resolve_content(&source, &fetcher, &doc, &retry).await?;
            let persisted = lock(&cache).set(doc.id.clone(), content.clone());
            if let Persistence::Failed(e) = persisted {
                debug!("Document '{}' cached in memory only: {e}", doc.id);
            }
            Ok(content)
        });

        async move {
            task.await
                .map_err(|e| Error::internal(format!("document load task failed: {e}")))?
        }
        .boxed()
        .shared()
    }

    /// Load every listed document that is not cached yet.
    ///
    /// Runs in batches of [`PRELOAD_CONCURRENCY`]. A failure never stops the
    /// rest of its batch or later batches.
    pub async fn preload_documents(&self, ids: &[String]) -> PreloadReport {
        let mut report = PreloadReport::default();
        let mut pending = Vec::new();

        for id in ids {
            match self.source.document(id) {
                None => report.missing.push(id.clone()),
                Some(_) if self.lock_cache().has(id) => report.skipped.push(id.clone()),
                Some(doc) => pending.push(doc),
            }
        }

        for batch in pending.chunks(PRELOAD_CONCURRENCY) {
            let outcomes = join_all(batch.iter().map(|doc| {
                self.boundary.execute(
                    || async { self.try_load_document(doc).await.map(Some) },
                    || None,
                    BoundaryContext::new("preload_documents").document(&doc.id),
                )
            }))
            .await;

            for (doc, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Some(_) => report.loaded.push(doc.id.clone()),
                    None => report.failed.push(doc.id.clone()),
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            missing = report.missing.len(),
            "Preload finished"
        );
        report
    }

    /// Cached markdown for `id`, if any.
    pub fn cached_content(&self, id: &str) -> Option<String> {
        self.lock_cache().get(id)
    }

    /// Drop every cached document, in memory and on disk.
    pub fn clear_cache(&self) -> Persistence {
        let result = self.lock_cache().clear();
        info!("Cleared document cache");
        result
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.lock_cache().stats()
    }

    /// Merge `update` into the retry policy used by subsequent loads.
    pub fn update_retry_config(&self, update: RetryConfigUpdate) {
        self.retry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(update);
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of loads currently being coalesced.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Release the in-memory cache and forget in-flight loads.
    ///
    /// The persisted snapshot survives for the next loader on the same
    /// store; only [`clear_cache`](Self::clear_cache) removes it. Loads
    /// already running finish for their current waiters but are not shared
    /// with later callers.
    pub fn destroy(&self) {
        self.lock_cache().release();
        let drained = std::mem::take(&mut *lock(&self.in_flight));
        drop(drained);
        debug!("Document loader destroyed");
    }

    fn lock_cache(&self) -> MutexGuard<'_, PersistentCache> {
        lock(&self.cache)
    }
}

async fn resolve_content(
    source: &DocumentSource,
    fetcher: &SourceFetcher,
    doc: &Document,
    retry: &RetryConfig,
) -> Result<String> {
    if let Some(content) = &doc.content {
        return Ok(content.clone());
    }
    let Some(file) = doc.file.as_deref() else {
        return Err(Error::document_not_found(&doc.id));
    };

    info!("Fetching document '{}' from {} source", doc.id, source.kind.as_str());
    with_retry(|| fetcher.fetch(source, file), retry)
        .await
        .map_err(|e| e.or_context("load_document", Some(doc.id.as_str())))
}

/// Removes its own in-flight entry however the load ends.
struct InFlightGuard {
    in_flight: InFlight,
    id: String,
    token: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = lock(&self.in_flight);
        if in_flight.get(&self.id).is_some_and(|entry| entry.token == self.token) {
            in_flight.remove(&self.id);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

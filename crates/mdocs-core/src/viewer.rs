//! Entry point tying the loader, search index and cleanup registry together.

use crate::config::SiteConfig;
use crate::loader::{DocumentLoader, PreloadReport};
use crate::memory::{CleanupHandle, MemoryManager};
use crate::persistent::{CacheStats, Persistence};
use crate::search::{SearchIndex, SearchOptions};
use crate::store::KeyValueStore;
use crate::{Document, Error, ErrorCode, Result, SearchHit};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

const SEARCH_CLEANUP_TASK: &str = "search-results";

/// Serializable summary of an initialization failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{message}")]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    pub user_message: String,
    pub retryable: bool,
}

impl From<&Error> for ErrorInfo {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code(),
            message: err.message().to_string(),
            user_message: err.user_message().to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Result of [`Viewer::init`].
#[derive(Debug)]
pub enum ViewerHandle {
    Ready(Viewer),
    Failed(ErrorInfo),
}

impl ViewerHandle {
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Convert into a standard `Result`.
    pub fn into_result(self) -> std::result::Result<Viewer, ErrorInfo> {
        match self {
            Self::Ready(viewer) => Ok(viewer),
            Self::Failed(info) => Err(info),
        }
    }
}

/// A documentation site ready to browse and search.
#[derive(Debug)]
pub struct Viewer {
    loader: DocumentLoader,
    documents: Vec<Document>,
    contents: Mutex<HashMap<String, String>>,
    index: Arc<Mutex<SearchIndex>>,
    memory: Arc<MemoryManager>,
    cleanup: Option<CleanupHandle>,
}

impl Viewer {
    /// Build a viewer from `config`.
    ///
    /// Never fails outright: configuration problems come back as
    /// [`ViewerHandle::Failed`] after being reported to the loader's boundary.
    pub async fn init(config: SiteConfig, store: Option<Arc<dyn KeyValueStore>>) -> ViewerHandle {
        let loader = match DocumentLoader::from_config(&config, store) {
            Ok(loader) => loader,
            Err(e) => return ViewerHandle::Failed(ErrorInfo::from(&e)),
        };
        if let Err(e) = loader.validate_source() {
            let e = e.or_context("init", None);
            loader.boundary().report(&e);
            return ViewerHandle::Failed(ErrorInfo::from(&e));
        }

        let mut documents = loader.load_all().await;
        documents.sort_by(display_order);

        let contents: HashMap<String, String> = documents
            .iter()
            .filter_map(|doc| loader.cached_content(&doc.id).map(|c| (doc.id.clone(), c)))
            .collect();

        let mut index = SearchIndex::new();
        index.update_index(&documents, &contents);
        let index = Arc::new(Mutex::new(index));

        let memory = Arc::new(MemoryManager::new());
        let search = Arc::clone(&index);
        memory.register(SEARCH_CLEANUP_TASK, move || lock(&search).clear_result_cache());

        info!(
            "Viewer ready with {} documents ({} cached)",
            documents.len(),
            contents.len()
        );
        ViewerHandle::Ready(Self {
            loader,
            documents,
            contents: Mutex::new(contents),
            index,
            memory,
            cleanup: None,
        })
    }

    /// Documents ordered by `order`, then title.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document(&self, id: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == id)
    }

    pub const fn loader(&self) -> &DocumentLoader {
        &self.loader
    }

    pub const fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// Load a document's markdown and make it searchable.
    ///
    /// An unknown id is an error; a load failure yields empty content.
    pub async fn open(&self, id: &str) -> Result<String> {
        let doc = self.document(id).ok_or_else(|| {
            let err = Error::document_not_found(id).or_context("open", Some(id));
            self.loader.boundary().report(&err);
            err
        })?;

        let content = self.loader.load_document(doc).await;
        if !content.is_empty() {
            let previous = lock(&self.contents).insert(doc.id.clone(), content.clone());
            if previous.as_deref() != Some(content.as_str()) {
                self.reindex();
            }
        }
        Ok(content)
    }

    /// Ranked search over titles, tags and every opened document.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchHit> {
        lock(&self.index).search_hits(query, options)
    }

    /// Preload `ids`, or every document when `ids` is empty.
    pub async fn preload(&self, ids: &[String]) -> PreloadReport {
        let ids: Vec<String> = if ids.is_empty() {
            self.documents.iter().map(|d| d.id.clone()).collect()
        } else {
            ids.to_vec()
        };

        let report = self.loader.preload_documents(&ids).await;
        let fresh: Vec<(String, String)> = report
            .loaded
            .iter()
            .chain(&report.skipped)
            .filter_map(|id| self.loader.cached_content(id).map(|c| (id.clone(), c)))
            .collect();
        if !fresh.is_empty() {
            lock(&self.contents).extend(fresh);
            self.reindex();
        }
        report
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.loader.get_cache_stats()
    }

    /// Clear the document cache and forget opened content.
    pub fn clear_cache(&self) -> Persistence {
        let result = self.loader.clear_cache();
        lock(&self.contents).clear();
        self.reindex();
        result
    }

    /// Run the registered cleanup tasks every `period`.
    pub fn start_periodic_cleanup(&mut self, period: Duration) {
        self.cleanup = Some(self.memory.spawn_periodic(period));
    }

    /// Stop background cleanup and release in-memory state.
    ///
    /// Persisted documents stay available to the next viewer.
    pub fn shutdown(mut self) {
        self.cleanup.take();
        self.memory.unregister(SEARCH_CLEANUP_TASK);
        self.loader.destroy();
        debug!("Viewer shut down");
    }

    fn reindex(&self) {
        let contents = lock(&self.contents);
        lock(&self.index).update_index(&self.documents, &contents);
    }
}

fn display_order(a: &Document, b: &Document) -> Ordering {
    match (a.order, b.order) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.title.cmp(&b.title))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

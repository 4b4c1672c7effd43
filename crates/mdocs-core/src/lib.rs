//! # mdocs-core
//!
//! Core functionality for mdocs - a markdown documentation viewer that loads
//! documents from local paths, plain URLs, GitHub repositories or inline
//! content, caches them across runs and searches them in memory.
//!
//! ## Architecture
//!
//! - **Errors**: one structured error model with codes, severity and a retry flag
//! - **Resilience**: [`retry::with_retry`] backoff and the [`ErrorBoundary`] fallback wrapper
//! - **Caching**: an LRU cache mirrored into a durable key-value store
//! - **Loading**: [`DocumentLoader`] with request coalescing per document id
//! - **Search**: a weighted inverted index over titles, tags and content
//! - **Viewer**: [`Viewer`] wires the pieces together from a [`SiteConfig`]
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::HashMap;
//! use mdocs_core::{Document, SearchIndex, SearchOptions};
//!
//! let documents = vec![
//!     Document::new("a", "Quick Start"),
//!     Document::new("b", "Start Here").with_content("quick reference"),
//! ];
//!
//! let mut index = SearchIndex::new();
//! index.update_index(&documents, &HashMap::new());
//!
//! let results = index.search("quick", &SearchOptions::default());
//! assert_eq!(results[0].id, "a");
//! ```
//!
//! ## Error Handling
//!
//! Fallible operations return [`Result<T, Error>`]. Loader and viewer
//! operations run inside an [`ErrorBoundary`] and return fallback values
//! instead:
//!
//! ```rust
//! use mdocs_core::{Error, ErrorCode};
//!
//! let err = Error::network("connection reset", None);
//! assert_eq!(err.code(), ErrorCode::NetworkError);
//! assert!(err.is_retryable());
//! ```

/// Error boundary: failures become handler reports plus fallback values
pub mod boundary;
/// Site configuration loaded from TOML
pub mod config;
/// GitHub directory discovery
pub mod discovery;
/// Error model and result alias
pub mod error;
/// One fetch strategy per source kind
pub mod fetcher;
/// Document loader with caching and request coalescing
pub mod loader;
/// Generic LRU cache
pub mod lru;
/// Named cleanup task registry
pub mod memory;
/// LRU cache with write-through persistence
pub mod persistent;
/// Retry with exponential backoff
pub mod retry;
/// In-memory inverted search index
pub mod search;
/// Durable key-value stores
pub mod store;
/// Core data types
pub mod types;
/// Viewer entry point
pub mod viewer;

// Re-export commonly used types
pub use boundary::{BoundaryContext, ErrorBoundary, ErrorHandler, LoggingHandler};
pub use config::{CacheSettings, HttpSettings, SiteConfig};
pub use discovery::{DiscoveryOptions, discover_github};
pub use error::{Classify, Error, ErrorCode, ErrorContext, Result, Severity};
pub use fetcher::{GithubPath, SourceFetcher};
pub use loader::{DocumentLoader, PreloadReport};
pub use lru::LruCache;
pub use memory::{CleanupHandle, MemoryManager};
pub use persistent::{CacheStats, Persistence, PersistentCache};
pub use retry::{RetryConfig, RetryConfigUpdate, with_retry};
pub use search::{SearchIndex, SearchOptions};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use types::*;
pub use viewer::{ErrorInfo, Viewer, ViewerHandle};

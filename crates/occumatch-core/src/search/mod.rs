//! Occupation code matching
//!
//! Resolves free-text queries against an occupation catalog.
//!
//! ## Features
//!
//! - Exact lookup by primary code, title (case-insensitive) or hierarchy code
//! - Embedding fallback with nearest-neighbor search over the whole catalog
//! - Offline hashing embedder, or an OpenAI-compatible Embedding API
//! - Persisted index, validated against the catalog fingerprint on load
//!
//! ## Usage
//!
//! ```rust,ignore
//! use occumatch_core::search::{HashEmbedder, Indexer, RecordStore, SearchConfig, Searcher};
//!
//! let config = SearchConfig::load()?;
//! let store = RecordStore::load(&config.paths.get_catalog_path(), &config.catalog)?;
//! let embedder = HashEmbedder::new(config.embedding.dimensions);
//! let (index, _stats) = Indexer::new(&config, &store, &embedder).open().await?;
//! let searcher = Searcher::new(
//!     Arc::new(store),
//!     Arc::new(index),
//!     Arc::new(embedder),
//!     (&config.search).into(),
//! )?;
//! let results = searcher.search("software developer", 5).await?;
//! ```

mod catalog;
mod config;
mod embedder;
#[cfg(feature = "openai")]
mod embedding;
mod error;
mod hash_embedder;
mod indexer;
mod searcher;
mod types;
mod vector_index;

#[cfg(test)]
mod tests;

pub use catalog::{Record, RecordFields, RecordStore, SearchableField, SEARCHABLE_FIELDS};
pub use config::{
    CatalogSchema, EmbeddingConfig, EmbeddingProvider, ExactScorePolicy, PathsConfig,
    SearchBehaviorConfig, SearchConfig,
};
pub use embedder::{Embedder, EmbedderInfo};
#[cfg(feature = "openai")]
pub use embedding::EmbeddingClient;
pub use error::{SearchError, SearchResult};
pub use hash_embedder::HashEmbedder;
pub use indexer::{clean, read_stats, IndexProgress, IndexStats, Indexer};
pub use searcher::{Searcher, SearcherOptions};
pub use types::*;
pub use vector_index::{l2_normalize, IndexStamp, Neighbor, VectorIndex, VectorSearch};

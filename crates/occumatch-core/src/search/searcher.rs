//! Tiered matcher
//!
//! Exact primary code, then exact title, then exact hierarchy code; the
//! first tier with any hit wins and returns all of its records. Only when
//! every exact tier misses is the query embedded and matched against the
//! vector index, capped at `top_k`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use super::catalog::{Record, RecordStore};
use super::config::{ExactScorePolicy, SearchBehaviorConfig};
use super::embedder::Embedder;
use super::error::{SearchError, SearchResult};
use super::types::{MatchResult, MatchTier, SearchOutcome};
use super::vector_index::{l2_normalize, VectorSearch};

/// Tunables for [`Searcher`]
#[derive(Debug, Clone)]
pub struct SearcherOptions {
    pub default_top_k: usize,
    pub description_limit: usize,
    pub query_timeout: Duration,
    pub max_concurrent_embeddings: usize,
    pub exact_score: ExactScorePolicy,
}

impl Default for SearcherOptions {
    fn default() -> Self {
        Self::from(&SearchBehaviorConfig::default())
    }
}

impl From<&SearchBehaviorConfig> for SearcherOptions {
    fn from(config: &SearchBehaviorConfig) -> Self {
        Self {
            default_top_k: config.default_top_k,
            description_limit: config.description_limit,
            query_timeout: Duration::from_millis(config.query_timeout_ms),
            max_concurrent_embeddings: config.max_concurrent_embeddings,
            exact_score: config.exact_score,
        }
    }
}

/// Resolves queries against one catalog and its index
pub struct Searcher {
    store: Arc<RecordStore>,
    index: Arc<dyn VectorSearch>,
    embedder: Arc<dyn Embedder>,
    options: SearcherOptions,
    embed_permits: Semaphore,
}

impl Searcher {
    /// The index must cover the store position-for-position and share the
    /// embedder's dimension.
    pub fn new(
        store: Arc<RecordStore>,
        index: Arc<dyn VectorSearch>,
        embedder: Arc<dyn Embedder>,
        options: SearcherOptions,
    ) -> SearchResult<Self> {
        if index.len() != store.len() {
            return Err(SearchError::IndexCorrupt(format!(
                "index holds {} vectors for {} records",
                index.len(),
                store.len()
            )));
        }
        if index.dimension() != embedder.dimension() {
            return Err(SearchError::IndexCorrupt(format!(
                "index dimension {} disagrees with provider dimension {}",
                index.dimension(),
                embedder.dimension()
            )));
        }
        let embed_permits = Semaphore::new(options.max_concurrent_embeddings.max(1));
        Ok(Self {
            store,
            index,
            embedder,
            options,
            embed_permits,
        })
    }

    pub fn options(&self) -> &SearcherOptions {
        &self.options
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Ranked matches for `query`; `top_k` caps only the vector tier
    pub async fn search(&self, query: &str, top_k: usize) -> SearchResult<Vec<MatchResult>> {
        Ok(self.search_outcome(query, top_k).await?.results)
    }

    /// Same as [`search`](Self::search) with the configured `top_k`
    pub async fn search_default(&self, query: &str) -> SearchResult<Vec<MatchResult>> {
        self.search(query, self.options.default_top_k).await
    }

    /// Ranked matches plus the tier that produced them
    pub async fn search_outcome(&self, query: &str, top_k: usize) -> SearchResult<SearchOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        if let Some((tier, hits)) = self.exact_tier(query) {
            let results = self.score_exact_hits(query, tier, &hits).await?;
            log::debug!(
                "[Searcher] {:?} matched {} tier ({} records)",
                query,
                tier,
                results.len()
            );
            return Ok(SearchOutcome::new(query.to_string(), tier, results));
        }

        let results = self.vector_tier(query, top_k).await?;
        log::debug!(
            "[Searcher] {:?} fell through to vector tier ({} results)",
            query,
            results.len()
        );
        Ok(SearchOutcome::new(query.to_string(), MatchTier::Vector, results))
    }

    /// First exact tier with any hit
    fn exact_tier(&self, query: &str) -> Option<(MatchTier, Vec<(usize, &Record)>)> {
        let hits = self.store.find_by_exact_code(query);
        if !hits.is_empty() {
            return Some((MatchTier::Code, hits));
        }
        let hits = self.store.find_by_exact_title(query);
        if !hits.is_empty() {
            return Some((MatchTier::Title, hits));
        }
        let hits = self.store.find_by_hierarchy_code(query);
        if !hits.is_empty() {
            return Some((MatchTier::Hierarchy, hits));
        }
        None
    }

    async fn score_exact_hits(
        &self,
        query: &str,
        tier: MatchTier,
        hits: &[(usize, &Record)],
    ) -> SearchResult<Vec<MatchResult>> {
        let limit = self.options.description_limit;
        if self.options.exact_score == ExactScorePolicy::Fixed {
            return Ok(hits
                .iter()
                .map(|(_, record)| MatchResult::from_record(record, 1.0, tier, limit))
                .collect());
        }

        let query_vector = self.within_budget(self.query_embedding(query)).await?;
        hits.iter()
            .map(|(position, record)| -> SearchResult<MatchResult> {
                let similarity = self
                    .index
                    .similarity(&query_vector, *position)
                    .ok_or_else(|| missing_position(*position))?;
                Ok(MatchResult::from_record(record, similarity, tier, limit))
            })
            .collect()
    }

    async fn vector_tier(&self, query: &str, top_k: usize) -> SearchResult<Vec<MatchResult>> {
        let neighbors = self
            .within_budget(async {
                let query_vector = self.query_embedding(query).await?;
                Ok::<_, SearchError>(self.index.search(&query_vector, top_k))
            })
            .await?;

        let limit = self.options.description_limit;
        neighbors
            .into_iter()
            .map(|neighbor| -> SearchResult<MatchResult> {
                let record = self
                    .store
                    .get(neighbor.position)
                    .ok_or_else(|| missing_position(neighbor.position))?;
                Ok(MatchResult::from_record(
                    record,
                    neighbor.score,
                    MatchTier::Vector,
                    limit,
                ))
            })
            .collect()
    }

    /// Unit-length query embedding, computed under the concurrency limit
    async fn query_embedding(&self, query: &str) -> SearchResult<Vec<f32>> {
        let _permit = self
            .embed_permits
            .acquire()
            .await
            .map_err(|_| SearchError::Embedding("embedding pool closed".to_string()))?;

        let mut vector = self.embedder.embed_one(query).await?;
        if vector.len() != self.index.dimension() {
            return Err(SearchError::Embedding(format!(
                "query embedding has dimension {}, index expects {}",
                vector.len(),
                self.index.dimension()
            )));
        }
        l2_normalize(&mut vector)
            .map_err(|e| SearchError::DegenerateVector(format!("query {query:?}: {e}")))?;
        Ok(vector)
    }

    async fn within_budget<T, F>(&self, fut: F) -> SearchResult<T>
    where
        F: Future<Output = SearchResult<T>>,
    {
        let budget = self.options.query_timeout;
        match tokio::time::timeout(budget, fut).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("[Searcher] Embedding/index search exceeded {:?}", budget);
                Err(SearchError::Timeout(budget))
            }
        }
    }
}

fn missing_position(position: usize) -> SearchError {
    SearchError::IndexCorrupt(format!("no catalog record at index position {position}"))
}

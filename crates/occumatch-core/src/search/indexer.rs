//! Index lifecycle: load the persisted index or rebuild it from the catalog

use std::path::PathBuf;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};

use super::catalog::RecordStore;
use super::config::SearchConfig;
use super::embedder::{check_output, Embedder};
use super::error::{SearchError, SearchResult};
use super::vector_index::{IndexStamp, VectorIndex, VectorSearch};

/// Index build statistics
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Records covered by the index
    pub record_count: usize,
    pub dimension: usize,
    pub embedder: String,
    /// Catalog fingerprint the index is pinned to
    pub fingerprint: String,
    /// Whether this run rebuilt the index (false when loaded from disk)
    #[serde(default)]
    pub rebuilt: bool,
    /// Time elapsed in milliseconds
    #[serde(default)]
    pub elapsed_ms: u64,
    /// Last updated timestamp (ms since epoch)
    pub last_updated: Option<u64>,
    /// Build time, RFC 3339
    pub built_at: Option<String>,
}

/// Index build progress
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexProgress {
    /// Current phase: "loading", "embedding", "storing", "done"
    pub phase: String,
    /// Current item being processed
    pub current: usize,
    /// Total items to process
    pub total: usize,
    /// Percentage complete (0-100)
    pub percent: u8,
    /// Optional message
    pub message: Option<String>,
}

/// Builds, persists and validates the vector index for one catalog
pub struct Indexer<'a> {
    config: &'a SearchConfig,
    store: &'a RecordStore,
    embedder: &'a dyn Embedder,
}

impl<'a> Indexer<'a> {
    pub fn new(
        config: &'a SearchConfig,
        store: &'a RecordStore,
        embedder: &'a dyn Embedder,
    ) -> Self {
        Self {
            config,
            store,
            embedder,
        }
    }

    /// Stamp a persisted index must carry to be reused
    pub fn expected_stamp(&self) -> IndexStamp {
        let info = self.embedder.info();
        IndexStamp {
            fingerprint: self.store.fingerprint().to_string(),
            embedder: info.name,
            dimension: info.dimension,
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.config.paths.get_index_path()
    }

    /// Check if index exists
    pub fn index_exists(&self) -> bool {
        self.index_path().exists()
    }

    /// Load the persisted index, or rebuild when it is absent or unusable
    pub async fn open(&self) -> SearchResult<(VectorIndex, IndexStats)> {
        self.open_with_progress(|_| {}).await
    }

    pub async fn open_with_progress<F>(
        &self,
        mut on_progress: F,
    ) -> SearchResult<(VectorIndex, IndexStats)>
    where
        F: FnMut(IndexProgress),
    {
        let start = Instant::now();
        let path = self.index_path();

        if path.exists() {
            on_progress(IndexProgress {
                phase: "loading".to_string(),
                current: 0,
                total: 1,
                percent: 0,
                message: Some(format!("Loading index from {}", path.display())),
            });

            match VectorIndex::load(&path, &self.expected_stamp()) {
                Ok(index) => {
                    log::info!(
                        "[Indexer] Loaded {} vectors from {}",
                        index.len(),
                        path.display()
                    );
                    let stats = self.stats_for(&index, false, start);
                    on_progress(done_progress(1));
                    return Ok((index, stats));
                }
                Err(SearchError::IndexCorrupt(reason)) => {
                    log::warn!("[Indexer] Discarding persisted index: {}", reason);
                }
                Err(e) => return Err(e),
            }
        } else {
            log::info!("[Indexer] No index at {}, building", path.display());
        }

        self.rebuild_with_progress(on_progress).await
    }

    /// Always embed the full catalog and overwrite the persisted index
    pub async fn rebuild(&self) -> SearchResult<(VectorIndex, IndexStats)> {
        self.rebuild_with_progress(|_| {}).await
    }

    pub async fn rebuild_with_progress<F>(
        &self,
        mut on_progress: F,
    ) -> SearchResult<(VectorIndex, IndexStats)>
    where
        F: FnMut(IndexProgress),
    {
        let start = Instant::now();
        let texts = self.store.searchable_texts();
        let total_records = texts.len();
        let batch_size = self.config.embedding.batch_size.max(1);
        let total_batches = total_records.div_ceil(batch_size);

        let mut embeddings = Vec::with_capacity(total_records);
        for (batch_idx, batch) in texts.chunks(batch_size).enumerate() {
            on_progress(IndexProgress {
                phase: "embedding".to_string(),
                current: batch_idx + 1,
                total: total_batches,
                percent: ((batch_idx * 90) / total_batches.max(1)) as u8,
                message: Some(format!(
                    "Embedding records ({}/{})",
                    embeddings.len(),
                    total_records
                )),
            });
            let batch_embeddings = self.embedder.embed_batch(batch).await?;
            embeddings.extend(batch_embeddings);
        }

        on_progress(IndexProgress {
            phase: "storing".to_string(),
            current: total_batches,
            total: total_batches,
            percent: 95,
            message: Some("Writing index...".to_string()),
        });

        // every record needs exactly one vector before the index is stamped
        check_output(&embeddings, total_records, self.embedder.dimension())?;
        let index = VectorIndex::build(embeddings, self.expected_stamp())?;
        index.save(&self.index_path())?;

        let stats = self.stats_for(&index, true, start);
        self.update_metadata(&stats)?;

        log::info!(
            "[Indexer] Built index: {} records, {}d, {} ms",
            stats.record_count,
            stats.dimension,
            stats.elapsed_ms
        );
        on_progress(done_progress(total_batches));
        Ok((index, stats))
    }

    fn stats_for(&self, index: &VectorIndex, rebuilt: bool, start: Instant) -> IndexStats {
        let stamp = index.stamp();
        let now = Utc::now();
        IndexStats {
            record_count: index.len(),
            dimension: stamp.dimension,
            embedder: stamp.embedder,
            fingerprint: stamp.fingerprint,
            rebuilt,
            elapsed_ms: start.elapsed().as_millis() as u64,
            last_updated: Some(now.timestamp_millis() as u64),
            built_at: rebuilt.then(|| now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }

    /// Persist index metadata next to the index
    fn update_metadata(&self, stats: &IndexStats) -> SearchResult<()> {
        let metadata_path = self.config.paths.get_index_metadata_path();
        if let Some(parent) = metadata_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&metadata_path, serde_json::to_string_pretty(stats)?)?;
        Ok(())
    }
}

fn done_progress(total: usize) -> IndexProgress {
    IndexProgress {
        phase: "done".to_string(),
        current: total,
        total,
        percent: 100,
        message: None,
    }
}

/// Read the stats written by the last rebuild, if any
pub fn read_stats(config: &SearchConfig) -> SearchResult<Option<IndexStats>> {
    let metadata_path = config.paths.get_index_metadata_path();
    if !metadata_path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&metadata_path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Remove the persisted index and its metadata
pub fn clean(config: &SearchConfig) -> SearchResult<()> {
    for path in [
        config.paths.get_index_path(),
        config.paths.get_index_metadata_path(),
    ] {
        match std::fs::remove_file(&path) {
            Ok(()) => log::info!("[Indexer] Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

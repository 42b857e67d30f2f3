
use std::{env, fs, path::PathBuf, sync::Arc};
use thiserror::Error;

pub mod history;
pub mod search;

use history::{HistoryEntry, SearchHistory};
use search::{
    Embedder, EmbeddingConfig, EmbeddingProvider, HashEmbedder, IndexStats, Indexer, MatchResult,
    RecordStore, SearchConfig, SearchError, SearchOutcome, Searcher,
};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Message(String),
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Search(#[from] SearchError),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Catalog, index and history wired from one configuration
#[derive(Clone)]
pub struct Occumatch {
    base_root: PathBuf,
    config: SearchConfig,
    searcher: Arc<Searcher>,
    embedder_name: String,
    stats: IndexStats,
    history: Option<Arc<SearchHistory>>,
}

#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub base_root: Option<PathBuf>,
    pub catalog_path: Option<PathBuf>,
    pub history_db_path: Option<PathBuf>,
    /// Used as-is instead of reading `config.toml` and the environment
    pub config: Option<SearchConfig>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EnvInfo {
    pub base_root: PathBuf,
    pub catalog_path: PathBuf,
    pub index_path: PathBuf,
    pub history_db_path: Option<PathBuf>,
    pub embedder: String,
    pub record_count: usize,
}

impl Occumatch {
    /// Load the catalog, then open (or build) its index before serving
    pub async fn initialize(overrides: EnvOverrides) -> CoreResult<Self> {
        let base_root = overrides
            .base_root
            .or_else(|| env_path("OCCUMATCH_ROOT"))
            .or_else(default_base_root)
            .ok_or_else(|| CoreError::Message("Unable to resolve user home directory".into()))?;

        let mut config = match overrides.config {
            Some(config) => {
                config.embedding.validate()?;
                config
            }
            None => SearchConfig::load()?,
        };
        if let Some(path) = overrides.catalog_path {
            config.paths.catalog_path = Some(path);
        }
        if let Some(path) = overrides.history_db_path {
            config.paths.history_db_path = Some(path);
        }
        config.paths = config.paths.rooted_at(&base_root);
        fs::create_dir_all(&base_root)?;

        let store = RecordStore::load(&config.paths.get_catalog_path(), &config.catalog)?;

        let embedder = build_embedder(&config.embedding)?;
        let embedder_name = embedder.info().name;
        let (index, stats) = Indexer::new(&config, &store, embedder.as_ref())
            .open()
            .await?;
        let searcher = Searcher::new(
            Arc::new(store),
            Arc::new(index),
            embedder,
            (&config.search).into(),
        )?;

        let history = if config.search.record_history {
            Some(Arc::new(SearchHistory::open(
                &config.paths.get_history_db_path(),
            )?))
        } else {
            None
        };

        Ok(Self {
            base_root,
            config,
            searcher: Arc::new(searcher),
            embedder_name,
            stats,
            history,
        })
    }

    pub async fn search(&self, query: &str, top_k: usize) -> CoreResult<Vec<MatchResult>> {
        Ok(self.search_outcome(query, top_k).await?.results)
    }

    /// Search with the configured `default_top_k`
    pub async fn search_default(&self, query: &str) -> CoreResult<Vec<MatchResult>> {
        self.search(query, self.config.search.default_top_k).await
    }

    pub async fn search_outcome(&self, query: &str, top_k: usize) -> CoreResult<SearchOutcome> {
        let outcome = self.searcher.search_outcome(query, top_k).await?;
        if let Some(ref history) = self.history {
            if let Err(e) = history.record(&outcome) {
                log::warn!("[Occumatch] Failed to record search history: {}", e);
            }
        }
        Ok(outcome)
    }

    /// Most recent searches first; empty when history is disabled
    pub fn history(&self, limit: usize) -> CoreResult<Vec<HistoryEntry>> {
        match self.history {
            Some(ref history) => history.recent(limit),
            None => Ok(Vec::new()),
        }
    }

    pub fn history_log(&self) -> Option<&SearchHistory> {
        self.history.as_deref()
    }

    /// Stats of the index opened at startup
    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn searcher(&self) -> &Searcher {
        &self.searcher
    }

    pub fn env_info(&self) -> EnvInfo {
        EnvInfo {
            base_root: self.base_root.clone(),
            catalog_path: self.config.paths.get_catalog_path(),
            index_path: self.config.paths.get_index_path(),
            history_db_path: self
                .history
                .as_ref()
                .map(|h| h.db_path().to_path_buf()),
            embedder: self.embedder_name.clone(),
            record_count: self.stats.record_count,
        }
    }
}

fn build_embedder(config: &EmbeddingConfig) -> CoreResult<Arc<dyn Embedder>> {
    match config.provider {
        EmbeddingProvider::Hash => Ok(Arc::new(
            HashEmbedder::new(config.dimensions).with_max_chars(config.max_input_chars),
        )),
        #[cfg(feature = "openai")]
        EmbeddingProvider::OpenAi => Ok(Arc::new(search::EmbeddingClient::new(config.clone())?)),
        #[cfg(not(feature = "openai"))]
        EmbeddingProvider::OpenAi => Err(SearchError::Config(
            "the openai provider requires the \"openai\" feature".into(),
        )
        .into()),
    }
}

fn default_base_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".occumatch"))
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var(key).ok().map(PathBuf::from)
}

//! Search configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::{SearchError, SearchResult};

/// Main search configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Search behavior configuration
    #[serde(default)]
    pub search: SearchBehaviorConfig,

    /// Paths configuration
    #[serde(default)]
    pub paths: PathsConfig,

    /// Catalog column layout
    #[serde(default)]
    pub catalog: CatalogSchema,
}

/// Which embedding provider backs the vector tier
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local feature-hashing embedder, no network
    #[default]
    Hash,
    /// OpenAI-compatible embeddings API
    OpenAi,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "openai" => Ok(Self::OpenAi),
            other => Err(SearchError::Config(format!(
                "unknown embedding provider: {other}"
            ))),
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// API key (can also use EMBEDDING_API_KEY / OPENAI_API_KEY env vars)
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding dimensions
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Texts longer than this many characters are truncated before embedding
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            api_key: None,
            api_base: default_api_base(),
            model: default_model(),
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
            max_input_chars: default_max_input_chars(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    /// Get API key from config or environment
    pub fn get_api_key(&self) -> SearchResult<String> {
        if let Some(ref key) = self.api_key {
            if !key.is_empty() {
                return Ok(key.clone());
            }
        }

        std::env::var("EMBEDDING_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| SearchError::ApiKeyMissing)
    }

    pub fn validate(&self) -> SearchResult<()> {
        if self.dimensions == 0 {
            return Err(SearchError::Config("embedding.dimensions must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(SearchError::Config("embedding.batch_size must be > 0".into()));
        }
        if self.max_input_chars == 0 {
            return Err(SearchError::Config(
                "embedding.max_input_chars must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_api_base() -> String {
    std::env::var("EMBEDDING_API_BASE").unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    // Hash provider uses this as-is; remote models report their own size:
    // - text-embedding-3-small: 1536
    // - text-embedding-3-large: 3072
    768
}

fn default_batch_size() -> usize {
    16
}

fn default_max_input_chars() -> usize {
    // ~512 tokens of English text
    2048
}

fn default_request_timeout_secs() -> u64 {
    60
}

/// Search behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchBehaviorConfig {
    /// Neighbors returned by the vector tier
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Descriptions longer than this many characters are clipped
    #[serde(default = "default_description_limit")]
    pub description_limit: usize,

    /// Budget for query embedding plus index search, in milliseconds
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Concurrent embedding calls allowed on the query path
    #[serde(default = "default_max_concurrent_embeddings")]
    pub max_concurrent_embeddings: usize,

    /// How exact-tier hits are scored
    #[serde(default)]
    pub exact_score: ExactScorePolicy,

    /// Record served queries in the history database
    #[serde(default = "default_record_history")]
    pub record_history: bool,
}

impl Default for SearchBehaviorConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            description_limit: default_description_limit(),
            query_timeout_ms: default_query_timeout_ms(),
            max_concurrent_embeddings: default_max_concurrent_embeddings(),
            exact_score: ExactScorePolicy::default(),
            record_history: default_record_history(),
        }
    }
}

/// Score reported for records selected by an exact tier
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExactScorePolicy {
    /// Cosine similarity between the query and the record embedding
    #[default]
    Similarity,
    /// Always 100%; the query is never embedded for exact hits
    Fixed,
}

fn default_top_k() -> usize {
    5
}

fn default_description_limit() -> usize {
    500
}

fn default_query_timeout_ms() -> u64 {
    30_000
}

fn default_max_concurrent_embeddings() -> usize {
    4
}

fn default_record_history() -> bool {
    true
}

/// Paths configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Catalog CSV path
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,

    /// Persisted vector index path
    #[serde(default)]
    pub index_path: Option<PathBuf>,

    /// Index metadata path
    #[serde(default)]
    pub index_metadata_path: Option<PathBuf>,

    /// Search history database path
    #[serde(default)]
    pub history_db_path: Option<PathBuf>,
}

const CATALOG_FILE: &str = "merged_volume.csv";
const INDEX_FILE: &str = "catalog.omvi";
const INDEX_METADATA_FILE: &str = "index-metadata.json";
const HISTORY_DB_FILE: &str = "history.db";

impl PathsConfig {
    pub fn get_catalog_path(&self) -> PathBuf {
        self.resolve(&self.catalog_path, CATALOG_FILE)
    }

    pub fn get_index_path(&self) -> PathBuf {
        self.resolve(&self.index_path, INDEX_FILE)
    }

    pub fn get_index_metadata_path(&self) -> PathBuf {
        self.resolve(&self.index_metadata_path, INDEX_METADATA_FILE)
    }

    pub fn get_history_db_path(&self) -> PathBuf {
        self.resolve(&self.history_db_path, HISTORY_DB_FILE)
    }

    /// Pin every unset path under `root` instead of the config directory
    pub fn rooted_at(&self, root: &Path) -> Self {
        let pin = |explicit: &Option<PathBuf>, file_name: &str| {
            Some(explicit.clone().unwrap_or_else(|| root.join(file_name)))
        };
        Self {
            catalog_path: pin(&self.catalog_path, CATALOG_FILE),
            index_path: pin(&self.index_path, INDEX_FILE),
            index_metadata_path: pin(&self.index_metadata_path, INDEX_METADATA_FILE),
            history_db_path: pin(&self.history_db_path, HISTORY_DB_FILE),
        }
    }

    fn resolve(&self, explicit: &Option<PathBuf>, file_name: &str) -> PathBuf {
        if let Some(ref path) = explicit {
            return path.clone();
        }
        SearchConfig::config_dir().join(file_name)
    }
}

/// Column names of the catalog CSV
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSchema {
    #[serde(default = "default_code_column")]
    pub code: String,
    #[serde(default = "default_title_column")]
    pub title: String,
    #[serde(default = "default_division_column")]
    pub division: String,
    #[serde(default = "default_subdivision_column")]
    pub subdivision: String,
    #[serde(default = "default_group_column")]
    pub group: String,
    #[serde(default = "default_family_column")]
    pub family: String,
    #[serde(default = "default_description_column")]
    pub description: String,
    /// Optional previous-edition code column
    #[serde(default = "default_legacy_code_column")]
    pub legacy_code: Option<String>,
    /// Columns discarded before deriving searchable text
    #[serde(default = "default_dropped_columns")]
    pub dropped: Vec<String>,
}

impl Default for CatalogSchema {
    fn default() -> Self {
        Self {
            code: default_code_column(),
            title: default_title_column(),
            division: default_division_column(),
            subdivision: default_subdivision_column(),
            group: default_group_column(),
            family: default_family_column(),
            description: default_description_column(),
            legacy_code: default_legacy_code_column(),
            dropped: default_dropped_columns(),
        }
    }
}

impl CatalogSchema {
    /// Columns that must be present in every catalog file
    pub fn required_columns(&self) -> [&str; 7] {
        [
            self.code.as_str(),
            self.title.as_str(),
            self.division.as_str(),
            self.subdivision.as_str(),
            self.group.as_str(),
            self.family.as_str(),
            self.description.as_str(),
        ]
    }
}

fn default_code_column() -> String {
    "title_Code".to_string()
}

fn default_title_column() -> String {
    "title_x".to_string()
}

fn default_division_column() -> String {
    "Division_code".to_string()
}

fn default_subdivision_column() -> String {
    "Subdivision_Code".to_string()
}

fn default_group_column() -> String {
    "Group_Code".to_string()
}

fn default_family_column() -> String {
    "Family_Code".to_string()
}

fn default_description_column() -> String {
    "Description".to_string()
}

fn default_legacy_code_column() -> Option<String> {
    Some("2004_code".to_string())
}

fn default_dropped_columns() -> Vec<String> {
    vec!["title_y".to_string()]
}

impl SearchConfig {
    /// Load configuration from file and environment
    /// Priority: environment variables > config.toml > defaults
    pub fn load() -> SearchResult<Self> {
        let mut config = Self::default();

        let toml_path = Self::config_path();
        if toml_path.exists() {
            let content = std::fs::read_to_string(&toml_path)?;
            match toml::from_str::<SearchConfig>(&content) {
                Ok(file_config) => config = file_config,
                Err(e) => {
                    log::warn!(
                        "[Config] Ignoring unreadable {}: {}",
                        toml_path.display(),
                        e
                    );
                }
            }
        }

        config.apply_env()?;
        config.embedding.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self) -> SearchResult<()> {
        if let Ok(provider) = std::env::var("OCCUMATCH_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider.parse()?;
        }
        if let Ok(api_base) = std::env::var("EMBEDDING_API_BASE") {
            self.embedding.api_base = api_base;
        }
        if let Ok(api_key) =
            std::env::var("EMBEDDING_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
        {
            self.embedding.api_key = Some(api_key);
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Ok(path) = std::env::var("OCCUMATCH_CATALOG_PATH") {
            self.paths.catalog_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Get base config directory
    pub fn config_dir() -> PathBuf {
        if let Ok(root) = std::env::var("OCCUMATCH_ROOT") {
            return PathBuf::from(root);
        }

        dirs::home_dir()
            .map(|h| h.join(".occumatch"))
            .unwrap_or_else(|| PathBuf::from(".occumatch"))
    }

    /// Get config file path (config.toml)
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

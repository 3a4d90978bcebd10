//! TOML-backed settings for every stage of the pipeline.
//!
//! A single `config.toml` under the base directory covers service endpoints,
//! chunking windows, ranking weights, and path-planning constants. Every
//! field has a serde default, so a partial file works and new fields never
//! break an old install.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level settings, one section per pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Qdrant endpoint (gRPC)
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Collection holding the chunk vectors
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Query expansion service configuration
    #[serde(default)]
    pub expansion: ExpansionConfig,

    /// Chunk sizing windows
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Path planning configuration
    #[serde(default)]
    pub path: PathPlanConfig,

    /// Resolved on-disk locations; derived at load time, never serialized
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model identifier the service is expected to run
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (index-wide constant, must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Embedding service base URL
    #[serde(default = "default_embedding_service_url")]
    pub service_url: String,

    /// Batch size per service call
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Bounded concurrency for service calls
    #[serde(default = "default_embedding_concurrency")]
    pub concurrency: usize,

    /// Maximum attempts per call (initial try + retries)
    #[serde(default = "default_embedding_max_attempts")]
    pub max_attempts: usize,

    /// Base backoff delay in milliseconds, doubled per retry
    #[serde(default = "default_embedding_backoff_ms")]
    pub backoff_ms: u64,

    /// Consecutive failures that open the circuit breaker
    #[serde(default = "default_breaker_failure_threshold")]
    pub breaker_failure_threshold: usize,

    /// Circuit-breaker cooldown window in seconds
    #[serde(default = "default_breaker_cooldown_secs")]
    pub breaker_cooldown_secs: u64,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

/// Query expansion service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionConfig {
    /// Generative service base URL
    #[serde(default = "default_expansion_service_url")]
    pub service_url: String,

    /// Default number of sentences to generate
    #[serde(default = "default_expansion_sentences")]
    pub default_sentences: usize,

    /// Request timeout in seconds
    #[serde(default = "default_expansion_timeout_secs")]
    pub timeout_secs: u64,
}

/// Chunk sizing windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Hard minimum words per chunk (prevents slivers)
    #[serde(default = "default_chunk_min_words")]
    pub min_words: usize,

    /// Hard maximum words per chunk (prevents runaway chunks)
    #[serde(default = "default_chunk_max_words")]
    pub max_words: usize,

    /// Sections below this word count merge into their parent
    #[serde(default = "default_min_section_words")]
    pub min_section_words: usize,
}

/// Retrieval and ranking knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of results
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,

    /// Maximum results allowed
    #[serde(default = "default_search_max_limit")]
    pub max_limit: usize,

    /// Minimum similarity score (0.0 - 1.0)
    #[serde(default = "default_search_min_score")]
    pub min_score: f32,

    /// Quality floor: chunks below this are excluded from default ranking
    #[serde(default = "default_quality_floor")]
    pub quality_floor: f64,

    /// Additive boost per overlapping concept tag
    #[serde(default = "default_concept_boost")]
    pub concept_boost: f32,

    /// Cap on total concept boost
    #[serde(default = "default_concept_boost_cap")]
    pub concept_boost_cap: f32,

    /// Multiplicative penalty below the quality floor
    #[serde(default = "default_low_quality_penalty")]
    pub low_quality_penalty: f32,

    /// Top-K cap on SIMILAR_TO edges per chunk
    #[serde(default = "default_similar_top_k")]
    pub similar_top_k: usize,
}

/// Path planning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathPlanConfig {
    /// Reading speed used for time estimates (words per minute)
    #[serde(default = "default_reading_wpm")]
    pub reading_wpm: f64,

    /// Time multiplier for exercise chunks
    #[serde(default = "default_exercise_multiplier")]
    pub exercise_multiplier: f64,

    /// Minimum hours attributed to one segment
    #[serde(default = "default_min_segment_hours")]
    pub min_segment_hours: f64,
}

/// On-disk locations derived from the base directory
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    pub base_dir: PathBuf,
    pub config_file: PathBuf,
    /// SQLite graph database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            collection_name: default_collection_name(),
            embedding: EmbeddingConfig::default(),
            expansion: ExpansionConfig::default(),
            chunk: ChunkConfig::default(),
            search: SearchConfig::default(),
            path: PathPlanConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            service_url: default_embedding_service_url(),
            batch_size: default_embedding_batch_size(),
            concurrency: default_embedding_concurrency(),
            max_attempts: default_embedding_max_attempts(),
            backoff_ms: default_embedding_backoff_ms(),
            breaker_failure_threshold: default_breaker_failure_threshold(),
            breaker_cooldown_secs: default_breaker_cooldown_secs(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            service_url: default_expansion_service_url(),
            default_sentences: default_expansion_sentences(),
            timeout_secs: default_expansion_timeout_secs(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            min_words: default_chunk_min_words(),
            max_words: default_chunk_max_words(),
            min_section_words: default_min_section_words(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            max_limit: default_search_max_limit(),
            min_score: default_search_min_score(),
            quality_floor: default_quality_floor(),
            concept_boost: default_concept_boost(),
            concept_boost_cap: default_concept_boost_cap(),
            low_quality_penalty: default_low_quality_penalty(),
            similar_top_k: default_similar_top_k(),
        }
    }
}

impl Default for PathPlanConfig {
    fn default() -> Self {
        Self {
            reading_wpm: default_reading_wpm(),
            exercise_multiplier: default_exercise_multiplier(),
            min_segment_hours: default_min_segment_hours(),
        }
    }
}

impl Config {
    /// Default data directory, `~/.syllabus`
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".syllabus")
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("graph.db"),
            base_dir: base,
        };
    }

    /// Read and validate settings from an explicit file; sibling paths
    /// (database, base dir) are derived from its location
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!(path = %config_path.display(), "loading settings");

        if !config_path.exists() {
            return Err(Error::NotInitialized);
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("graph.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Read settings from the default location
    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_config_path())
    }

    /// Create and save a fresh configuration at `base_dir`
    pub fn init(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            return Err(Error::AlreadyInitialized(
                config.paths.config_file.display().to_string(),
            ));
        }

        std::fs::create_dir_all(&config.paths.base_dir)?;
        config.save()?;
        Ok(config)
    }

    /// Write the current settings back to their file
    pub fn save(&self) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        debug!(path = %self.paths.config_file.display(), "settings written");
        Ok(())
    }

    /// Reject values that would make a pipeline stage misbehave silently
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(Error::Config(
                "embedding.dimension must be greater than zero".to_string(),
            ));
        }
        if self.embedding.max_attempts == 0 {
            return Err(Error::Config(
                "embedding.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.embedding.concurrency == 0 {
            return Err(Error::Config(
                "embedding.concurrency must be at least 1".to_string(),
            ));
        }
        if self.chunk.min_words >= self.chunk.max_words {
            return Err(Error::Config(format!(
                "chunk.min_words ({}) must be below chunk.max_words ({})",
                self.chunk.min_words, self.chunk.max_words
            )));
        }
        if !(0.0..=1.0).contains(&self.search.min_score) {
            return Err(Error::Config(
                "search.min_score must be within [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.search.quality_floor) {
            return Err(Error::Config(
                "search.quality_floor must be within [0, 1]".to_string(),
            ));
        }
        if self.search.similar_top_k == 0 {
            return Err(Error::Config(
                "search.similar_top_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_chunk_window() {
        let mut config = Config::default();
        config.chunk.min_words = 600;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_min_score() {
        let mut config = Config::default();
        config.search.min_score = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_preserves_fields() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.embedding.dimension, config.embedding.dimension);
        assert_eq!(parsed.search.similar_top_k, config.search.similar_top_k);
        assert_eq!(parsed.chunk.max_words, config.chunk.max_words);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let parsed: Config = toml::from_str("[chunk]\nmin_words = 40\n").unwrap();
        assert_eq!(parsed.chunk.min_words, 40);
        assert_eq!(parsed.chunk.max_words, default_chunk_max_words());
        assert_eq!(parsed.search.default_limit, default_search_limit());
    }

    #[test]
    fn test_init_writes_config_and_reload_matches() {
        let temp = tempfile::TempDir::new().unwrap();
        let base = temp.path().join("syllabus");

        let config = Config::init(Some(base.clone())).unwrap();
        assert!(config.paths.config_file.exists());
        assert_eq!(config.paths.db_file, base.join("graph.db"));

        let reloaded = Config::load(&config.paths.config_file).unwrap();
        assert_eq!(reloaded.embedding.model, config.embedding.model);
        assert_eq!(reloaded.paths.base_dir, base);
    }

    #[test]
    fn test_init_refuses_to_clobber_existing_config() {
        let temp = tempfile::TempDir::new().unwrap();
        let base = temp.path().to_path_buf();

        Config::init(Some(base.clone())).unwrap();
        assert!(matches!(
            Config::init(Some(base)),
            Err(Error::AlreadyInitialized(_))
        ));
    }
}

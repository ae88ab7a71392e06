//! Configuration for the ingestion and query pipelines.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes. Files ending in `.json` are read as JSON, anything else as TOML.

use crate::agents::RetryConfig;
use crate::errors::{RagflowError, Result};
use crate::stores::SearchMethod;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Deadline and retry settings applied to each agent call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCallConfig {
    /// Per-call deadline in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retry behavior.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_timeout_ms() -> u64 {
    60_000
}

impl Default for AgentCallConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl AgentCallConfig {
    /// Sets the deadline.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the retry behavior.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Gets the deadline as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// How the combine stage matches raw contexts with their summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingMode {
    /// Look up the summary carrying the same id.
    #[default]
    ById,
    /// Pair by position; pairs whose ids differ are dropped.
    Positional,
}

/// Ingestion pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Token budget per chunk.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Tokens shared by adjacent chunks.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// Fragments below this size are merged into their predecessor.
    #[serde(default)]
    pub min_chunk_tokens: usize,
    /// Agent calls in flight during enrich and extract.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Combine-stage pairing.
    #[serde(default)]
    pub pairing: PairingMode,
    /// Drop extracted jargon whose evidence is not quoted from the context.
    #[serde(default = "default_true")]
    pub require_literal_evidence: bool,
    /// Summarizer and extractor call settings.
    #[serde(default)]
    pub agent: AgentCallConfig,
}

fn default_max_tokens() -> usize {
    500
}

fn default_overlap() -> usize {
    150
}

fn default_concurrency() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap: default_overlap(),
            min_chunk_tokens: 0,
            concurrency: default_concurrency(),
            pairing: PairingMode::default(),
            require_literal_evidence: default_true(),
            agent: AgentCallConfig::default(),
        }
    }
}

impl IngestionConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the chunk token budget and overlap.
    #[must_use]
    pub fn with_chunking(mut self, max_tokens: usize, overlap: usize) -> Self {
        self.max_tokens = max_tokens;
        self.overlap = overlap;
        self
    }

    /// Sets the fan-out width.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the pairing mode.
    #[must_use]
    pub fn with_pairing(mut self, pairing: PairingMode) -> Self {
        self.pairing = pairing;
        self
    }

    /// Sets whether evidence must appear verbatim in the context.
    #[must_use]
    pub fn with_literal_evidence(mut self, required: bool) -> Self {
        self.require_literal_evidence = required;
        self
    }

    /// Checks the values.
    ///
    /// # Errors
    ///
    /// Returns a config error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(RagflowError::config("ingestion.max_tokens must be positive"));
        }
        if self.overlap >= self.max_tokens {
            return Err(RagflowError::config(format!(
                "ingestion.overlap ({}) must be smaller than max_tokens ({})",
                self.overlap, self.max_tokens
            )));
        }
        if self.concurrency == 0 {
            return Err(RagflowError::config("ingestion.concurrency must be positive"));
        }
        Ok(())
    }
}

/// Jargon subflow and jargon store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JargonConfig {
    /// Detections must score strictly above this.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Jargon store hits per detected term.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Table name.
    #[serde(default = "default_table")]
    pub table: String,
}

fn default_confidence_threshold() -> f64 {
    0.5
}

fn default_search_limit() -> usize {
    5
}

fn default_database_path() -> PathBuf {
    PathBuf::from("jargon.db")
}

fn default_table() -> String {
    "jargons".to_string()
}

impl Default for JargonConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            search_limit: default_search_limit(),
            database_path: default_database_path(),
            table: default_table(),
        }
    }
}

impl JargonConfig {
    /// Sets the confidence threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Sets the per-term hit limit.
    #[must_use]
    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    /// Sets the jargon store database file and table.
    #[must_use]
    pub fn with_store(mut self, database_path: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        self.database_path = database_path.into();
        self.table = table.into();
        self
    }

    /// Checks the values.
    ///
    /// # Errors
    ///
    /// Returns a config error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(RagflowError::config(format!(
                "jargon.confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.table.is_empty() {
            return Err(RagflowError::config("jargon.table must not be empty"));
        }
        Ok(())
    }
}

/// Retrieval subflow settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Results per query and reranker `top_n`.
    #[serde(default = "default_memory_limit")]
    pub memory_limit: usize,
    /// Context store search method.
    #[serde(default)]
    pub search_method: SearchMethod,
    /// Queries in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_memory_limit() -> usize {
    10
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            memory_limit: default_memory_limit(),
            search_method: SearchMethod::default(),
            concurrency: default_concurrency(),
        }
    }
}

impl RetrievalConfig {
    /// Sets the per-query limit.
    #[must_use]
    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = limit;
        self
    }

    /// Sets the search method.
    #[must_use]
    pub fn with_search_method(mut self, method: SearchMethod) -> Self {
        self.search_method = method;
        self
    }

    /// Checks the values.
    ///
    /// # Errors
    ///
    /// Returns a config error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.memory_limit == 0 {
            return Err(RagflowError::config("retrieval.memory_limit must be positive"));
        }
        if self.concurrency == 0 {
            return Err(RagflowError::config("retrieval.concurrency must be positive"));
        }
        Ok(())
    }
}

/// Query pipeline settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Jargon subflow.
    #[serde(default)]
    pub jargon: JargonConfig,
    /// Retrieval subflow.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Agent call settings for the query-time agents.
    #[serde(default)]
    pub agent: AgentCallConfig,
}

impl QueryConfig {
    /// Checks the values.
    ///
    /// # Errors
    ///
    /// Returns a config error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.jargon.validate()?;
        self.retrieval.validate()
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RagflowConfig {
    /// Ingestion pipeline.
    #[serde(default)]
    pub ingestion: IngestionConfig,
    /// Query pipeline.
    #[serde(default)]
    pub query: QueryConfig,
}

impl RagflowConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns a config error for malformed TOML or invalid values.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).map_err(|e| RagflowError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns a config error for malformed JSON or invalid values.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(input).map_err(|e| RagflowError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a config file, JSON if the extension is `.json`, else TOML.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, or a config error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&input),
            _ => Self::from_toml_str(&input),
        }
    }

    /// Checks every section.
    ///
    /// # Errors
    ///
    /// Returns a config error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.ingestion.validate()?;
        self.query.validate()
    }
}

//! Retrieval collaborators: context stores, reranker, embedding model, and
//! the jargon store.

mod jargon;
mod memory;
pub(crate) mod scoring;

pub use jargon::{JargonStore, ScoredJargon};
pub use memory::InMemoryContextStore;

use crate::core::Context;
use crate::errors::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// How a context store matches a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    /// Embedding similarity.
    #[default]
    Vector,
    /// Lexical BM25.
    Fulltext,
    /// Rank fusion of vector and fulltext.
    Hybrid,
}

impl std::fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vector => write!(f, "vector"),
            Self::Fulltext => write!(f, "fulltext"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// One tier of context storage (raw, enriched or long-term).
#[async_trait]
pub trait ContextStore: Send + Sync + Debug {
    /// Returns the store name used in logs and errors.
    fn name(&self) -> &str;

    /// Persists contexts.
    async fn add(&self, contexts: &[Context]) -> Result<(), StoreError>;

    /// Returns at most `limit` contexts for `query`, best first.
    async fn search(&self, query: &str, limit: usize, method: SearchMethod) -> Result<Vec<Context>, StoreError>;
}

/// Contexts reordered by a reranker, with one score per context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reranked {
    /// Contexts, best first.
    pub contexts: Vec<Context>,
    /// Relevance scores aligned with `contexts`.
    pub scores: Vec<f64>,
}

/// Second-pass relevance model.
#[async_trait]
pub trait Reranker: Send + Sync + Debug {
    /// Returns the reranker name.
    fn name(&self) -> &str;

    /// Reorders `contexts` for `query`, keeping at most `top_n`.
    async fn rerank(&self, query: &str, contexts: &[Context], top_n: usize) -> Result<Reranked, StoreError>;
}

/// Text embedding model.
#[async_trait]
pub trait EmbeddingModel: Send + Sync + Debug {
    /// Returns the model name.
    fn name(&self) -> &str;

    /// Embeds each text into one row of the returned matrix.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError>;
}

/// Shared context store handle.
pub type SharedContextStore = Arc<dyn ContextStore>;
/// Shared reranker handle.
pub type SharedReranker = Arc<dyn Reranker>;
/// Shared embedding model handle.
pub type SharedEmbeddingModel = Arc<dyn EmbeddingModel>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_method_serde() {
        assert_eq!(serde_json::to_string(&SearchMethod::Fulltext).unwrap(), "\"fulltext\"");
        let parsed: SearchMethod = serde_json::from_str("\"hybrid\"").unwrap();
        assert_eq!(parsed, SearchMethod::Hybrid);
        assert_eq!(SearchMethod::default(), SearchMethod::Vector);
        assert_eq!(SearchMethod::Vector.to_string(), "vector");
    }
}

//! Multi-query retrieval with optional reranking.

use crate::config::RetrievalConfig;
use crate::core::{dedup_by_id, Context};
use crate::errors::{RagflowError, Result, StoreError};
use crate::state::QueryState;
use crate::stores::{SharedContextStore, SharedReranker};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

/// What a retrieval run produced.
#[derive(Debug, Default)]
pub struct RetrievalReport {
    /// Number of queries sent to the store.
    pub queries: usize,
    /// Hits across all queries, duplicates included.
    pub hits: usize,
    /// Hits left after de-duplication.
    pub unique: usize,
    /// Contexts kept by the reranker, if it ran and succeeded.
    pub reranked: Option<usize>,
    /// Reranker failure. Retrieval output stands when this is set.
    pub rerank_error: Option<RagflowError>,
}

/// Searches the context store once per query, de-duplicates by id in
/// first-seen order and optionally reranks against the original message.
#[derive(Debug, Clone)]
pub struct RetrievalSubflow {
    store: SharedContextStore,
    reranker: Option<SharedReranker>,
    config: RetrievalConfig,
}

impl RetrievalSubflow {
    /// Creates a subflow over `store` without a reranker.
    #[must_use]
    pub fn new(store: SharedContextStore) -> Self {
        Self {
            store,
            reranker: None,
            config: RetrievalConfig::default(),
        }
    }

    /// Adds a reranker.
    #[must_use]
    pub fn with_reranker(mut self, reranker: SharedReranker) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Sets the search limit, method and fan-out.
    #[must_use]
    pub fn with_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns true if a reranker is configured.
    #[must_use]
    pub const fn has_reranker(&self) -> bool {
        self.reranker.is_some()
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Runs every query against the store and concatenates the hits in
    /// query order. The first failing query fails the whole search.
    ///
    /// # Errors
    ///
    /// Returns the first store error.
    pub async fn search_all(&self, queries: &[String]) -> std::result::Result<Vec<Context>, StoreError> {
        let limit = self.config.memory_limit;
        let method = self.config.search_method;

        let per_query: Vec<Vec<Context>> = stream::iter(queries.iter().map(|query| self.store.search(query, limit, method)))
            .buffered(self.config.concurrency.max(1))
            .try_collect()
            .await?;

        Ok(per_query.into_iter().flatten().collect())
    }

    /// Retrieves contexts for `state.retrieval_queries()` and writes
    /// `retrieved_contexts`, then `reranked_contexts` when a reranker is set.
    ///
    /// # Errors
    ///
    /// Returns store errors from the search and state conflicts. A reranker
    /// failure is reported in [`RetrievalReport::rerank_error`] instead.
    pub async fn run(&self, state: &mut QueryState) -> Result<RetrievalReport> {
        let queries = state.retrieval_queries();
        let hits = self.search_all(&queries).await?;

        let mut report = RetrievalReport {
            queries: queries.len(),
            hits: hits.len(),
            ..RetrievalReport::default()
        };

        let unique = dedup_by_id(hits);
        report.unique = unique.len();
        debug!(queries = report.queries, hits = report.hits, unique = report.unique, "Retrieved contexts");

        let Some(reranker) = &self.reranker else {
            state.set_retrieved_contexts(unique)?;
            return Ok(report);
        };

        let reranked = reranker
            .rerank(state.original_message(), &unique, self.config.memory_limit)
            .await;
        state.set_retrieved_contexts(unique)?;

        match reranked {
            Ok(reranked) => {
                report.reranked = Some(reranked.contexts.len());
                state.set_reranked_contexts(reranked.contexts)?;
            }
            Err(err) => report.rerank_error = Some(err.into()),
        }
        Ok(report)
    }
}

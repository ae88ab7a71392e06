use super::scoring::{bm25_scores, cosine_similarity, rank_desc, reciprocal_rank_fusion, tokenize};
use super::{ContextStore, SearchMethod, SharedEmbeddingModel};
use crate::core::Context;
use crate::errors::StoreError;
use async_trait::async_trait;
use parking_lot::RwLock;

#[derive(Debug, Clone)]
struct Entry {
    context: Context,
    tokens: Vec<String>,
    embedding: Option<Vec<f32>>,
}

/// A context store held in memory.
///
/// Fulltext search is BM25 over the context text. Vector and hybrid search
/// need an embedding model; contexts are embedded once, when added.
#[derive(Debug)]
pub struct InMemoryContextStore {
    name: String,
    entries: RwLock<Vec<Entry>>,
    embedding: Option<SharedEmbeddingModel>,
}

impl InMemoryContextStore {
    /// Creates an empty store without an embedding model.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(Vec::new()),
            embedding: None,
        }
    }

    /// Sets the embedding model used for vector and hybrid search.
    #[must_use]
    pub fn with_embedding(mut self, model: SharedEmbeddingModel) -> Self {
        self.embedding = Some(model);
        self
    }

    /// Number of stored contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All stored contexts in insertion order.
    #[must_use]
    pub fn contexts(&self) -> Vec<Context> {
        self.entries.read().iter().map(|e| e.context.clone()).collect()
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, StoreError> {
        let model = self.embedding.as_ref().ok_or_else(|| {
            StoreError::unsupported(&self.name, "vector search requires an embedding model")
        })?;
        model
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::collaborator(model.name(), "embedding returned no rows"))
    }

    fn vector_ranking(entries: &[Entry], query_vector: &[f32]) -> Vec<usize> {
        let scores: Vec<f64> = entries
            .iter()
            .map(|e| {
                e.embedding
                    .as_deref()
                    .map_or(0.0, |v| cosine_similarity(query_vector, v))
            })
            .collect();
        rank_desc(&scores)
    }

    fn fulltext_ranking(entries: &[Entry], query: &str) -> Vec<usize> {
        let documents: Vec<Vec<String>> = entries.iter().map(|e| e.tokens.clone()).collect();
        let scores = bm25_scores(query, &documents);
        rank_desc(&scores)
            .into_iter()
            .filter(|i| scores[*i] > 0.0)
            .collect()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, contexts: &[Context]) -> Result<(), StoreError> {
        if contexts.is_empty() {
            return Ok(());
        }

        let embeddings = match &self.embedding {
            Some(model) => {
                let texts: Vec<String> = contexts.iter().map(|c| c.text.clone()).collect();
                let rows = model.embed(&texts).await?;
                if rows.len() != contexts.len() {
                    return Err(StoreError::collaborator(
                        model.name(),
                        format!("expected {} embeddings, got {}", contexts.len(), rows.len()),
                    ));
                }
                rows.into_iter().map(Some).collect()
            }
            None => vec![None; contexts.len()],
        };

        let mut entries = self.entries.write();
        for (context, embedding) in contexts.iter().zip(embeddings) {
            let entry = Entry {
                tokens: tokenize(&context.text),
                context: context.clone(),
                embedding,
            };
            match entries.iter().position(|e| e.context.id == context.id) {
                Some(index) => entries[index] = entry,
                None => entries.push(entry),
            }
        }

        tracing::debug!(store = %self.name, added = contexts.len(), total = entries.len(), "Stored contexts");
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize, method: SearchMethod) -> Result<Vec<Context>, StoreError> {
        let query_vector = match method {
            SearchMethod::Vector | SearchMethod::Hybrid => Some(self.embed_query(query).await?),
            SearchMethod::Fulltext => None,
        };

        let entries = self.entries.read();
        let order = match (method, query_vector) {
            (SearchMethod::Fulltext, _) => Self::fulltext_ranking(&entries, query),
            (SearchMethod::Vector, Some(vector)) => Self::vector_ranking(&entries, &vector),
            (SearchMethod::Hybrid, Some(vector)) => {
                let rankings = [
                    Self::vector_ranking(&entries, &vector),
                    Self::fulltext_ranking(&entries, query),
                ];
                rank_desc(&reciprocal_rank_fusion(&rankings, entries.len()))
            }
            (_, None) => Vec::new(),
        };

        Ok(order
            .into_iter()
            .take(limit)
            .map(|i| entries[i].context.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Metadata;
    use crate::stores::EmbeddingModel;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    /// Embeds a text as counts of a few fixed keywords.
    #[derive(Debug)]
    struct KeywordEmbedding;

    #[async_trait]
    impl EmbeddingModel for KeywordEmbedding {
        fn name(&self) -> &str {
            "keywords"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    ["battery", "brush", "app"]
                        .iter()
                        .map(|k| lower.matches(k).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    fn ctx(id: &str, text: &str) -> Context {
        Context::new(id, text, Metadata::new())
    }

    fn ids(contexts: &[Context]) -> Vec<&str> {
        contexts.iter().map(|c| c.id.as_str()).collect()
    }

    async fn seeded(store: InMemoryContextStore) -> InMemoryContextStore {
        store
            .add(&[
                ctx("1", "The battery lasts 60 minutes"),
                ctx("2", "Replace the brush monthly"),
                ctx("3", "Pair the app over wifi, the app shows battery level"),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_fulltext_search_ranks_and_excludes_misses() {
        let store = seeded(InMemoryContextStore::new("raw")).await;

        let results = store.search("brush", 10, SearchMethod::Fulltext).await.unwrap();
        assert_eq!(ids(&results), vec!["2"]);

        let results = store.search("battery", 10, SearchMethod::Fulltext).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_limit_truncates() {
        let store = seeded(InMemoryContextStore::new("raw")).await;
        let results = store.search("battery app", 1, SearchMethod::Fulltext).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_vector_search_requires_model() {
        let store = seeded(InMemoryContextStore::new("raw")).await;
        let err = store.search("battery", 3, SearchMethod::Vector).await.unwrap_err();
        assert!(matches!(err, StoreError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn test_vector_search() {
        let store = seeded(InMemoryContextStore::new("raw").with_embedding(Arc::new(KeywordEmbedding))).await;

        let results = store.search("brush", 1, SearchMethod::Vector).await.unwrap();
        assert_eq!(ids(&results), vec!["2"]);
    }

    #[tokio::test]
    async fn test_hybrid_search() {
        let store = seeded(InMemoryContextStore::new("raw").with_embedding(Arc::new(KeywordEmbedding))).await;

        let results = store.search("app", 3, SearchMethod::Hybrid).await.unwrap();
        assert_eq!(results[0].id, "3");
    }

    #[tokio::test]
    async fn test_readding_id_replaces_in_place() {
        let store = seeded(InMemoryContextStore::new("raw")).await;
        store.add(&[ctx("2", "Replace the roller monthly")]).await.unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(ids(&store.contexts()), vec!["1", "2", "3"]);
        assert_eq!(store.contexts()[1].text, "Replace the roller monthly");
    }
}

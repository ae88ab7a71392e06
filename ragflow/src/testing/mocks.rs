//! Mock collaborators for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::agents::Agent;
use crate::core::Context;
use crate::errors::{AgentError, RagflowError, Result, StoreError};
use crate::ingest::DocumentLoader;
use crate::stores::scoring::tokenize;
use crate::stores::{ContextStore, EmbeddingModel, Reranked, Reranker, SearchMethod};

type Respond<Req, Resp> = Box<dyn Fn(&Req) -> std::result::Result<Resp, AgentError> + Send + Sync>;

/// An agent that answers from a closure and records every request.
pub struct MockAgent<Req, Resp> {
    name: String,
    respond: Respond<Req, Resp>,
    delay: Option<Duration>,
    requests: Mutex<Vec<Req>>,
}

impl<Req, Resp> MockAgent<Req, Resp> {
    /// Creates an agent that answers with `respond`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        respond: impl Fn(&Req) -> std::result::Result<Resp, AgentError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            respond: Box::new(respond),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Creates an agent that always answers `response`.
    #[must_use]
    pub fn returning(name: impl Into<String>, response: Resp) -> Self
    where
        Resp: Clone + Send + Sync + 'static,
    {
        Self::new(name, move |_| Ok(response.clone()))
    }

    /// Creates an agent that always fails with `reason`.
    #[must_use]
    pub fn failing(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let name = name.into();
        let (agent, reason) = (name.clone(), reason.into());
        Self::new(name, move |_| Err(AgentError::failed(agent.clone(), reason.clone())))
    }

    /// Sleeps before answering.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns the requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<Req>
    where
        Req: Clone,
    {
        self.requests.lock().clone()
    }
}

impl<Req, Resp> Debug for MockAgent<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockAgent")
            .field("name", &self.name)
            .field("delay", &self.delay)
            .field("calls", &self.requests.lock().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<Req, Resp> Agent<Req, Resp> for MockAgent<Req, Resp>
where
    Req: Clone + Send + Sync + 'static,
    Resp: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, request: Req) -> std::result::Result<Resp, AgentError> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.respond)(&request)
    }
}

/// A context store with canned results per query.
#[derive(Debug, Default)]
pub struct MockContextStore {
    name: String,
    results: HashMap<String, Vec<Context>>,
    fail_add: Option<String>,
    fail_search: Option<String>,
    added: Mutex<Vec<Context>>,
    queries: Mutex<Vec<(String, usize, SearchMethod)>>,
}

impl MockContextStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Answers `query` with `contexts`. Other queries get no hits.
    #[must_use]
    pub fn with_results(mut self, query: impl Into<String>, contexts: Vec<Context>) -> Self {
        self.results.insert(query.into(), contexts);
        self
    }

    /// Makes every `add` fail.
    #[must_use]
    pub fn failing_add(mut self, message: impl Into<String>) -> Self {
        self.fail_add = Some(message.into());
        self
    }

    /// Makes every `search` fail.
    #[must_use]
    pub fn failing_search(mut self, message: impl Into<String>) -> Self {
        self.fail_search = Some(message.into());
        self
    }

    /// Returns every context added, in order.
    #[must_use]
    pub fn added(&self) -> Vec<Context> {
        self.added.lock().clone()
    }

    /// Returns the queries received with their limit and method.
    #[must_use]
    pub fn queries(&self) -> Vec<(String, usize, SearchMethod)> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl ContextStore for MockContextStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, contexts: &[Context]) -> std::result::Result<(), StoreError> {
        if let Some(message) = &self.fail_add {
            return Err(StoreError::database(&self.name, message.clone()));
        }
        self.added.lock().extend_from_slice(contexts);
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        method: SearchMethod,
    ) -> std::result::Result<Vec<Context>, StoreError> {
        self.queries.lock().push((query.to_string(), limit, method));
        if let Some(message) = &self.fail_search {
            return Err(StoreError::database(&self.name, message.clone()));
        }
        Ok(self
            .results
            .get(query)
            .map(|hits| hits.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// Arguments of one reranker call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RerankCall {
    /// Query passed to the reranker.
    pub query: String,
    /// Ids of the candidate contexts, in input order.
    pub ids: Vec<String>,
    /// Requested size.
    pub top_n: usize,
}

/// A reranker that reverses its input, or fails.
#[derive(Debug, Default)]
pub struct MockReranker {
    fail: Option<String>,
    calls: Mutex<Vec<RerankCall>>,
}

impl MockReranker {
    /// Creates a reranker that reverses the candidates.
    #[must_use]
    pub fn reversing() -> Self {
        Self::default()
    }

    /// Creates a reranker that always fails.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail: Some(message.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns the calls received.
    #[must_use]
    pub fn calls(&self) -> Vec<RerankCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Reranker for MockReranker {
    fn name(&self) -> &str {
        "mock-reranker"
    }

    async fn rerank(
        &self,
        query: &str,
        contexts: &[Context],
        top_n: usize,
    ) -> std::result::Result<Reranked, StoreError> {
        self.calls.lock().push(RerankCall {
            query: query.to_string(),
            ids: contexts.iter().map(|c| c.id.clone()).collect(),
            top_n,
        });
        if let Some(message) = &self.fail {
            return Err(StoreError::collaborator(self.name(), message.clone()));
        }

        let contexts: Vec<Context> = contexts.iter().rev().take(top_n).cloned().collect();
        let scores = (0..contexts.len()).map(|i| 1.0 / (i as f64 + 1.0)).collect();
        Ok(Reranked { contexts, scores })
    }
}

/// Deterministic bag-of-words embedding: every token is hashed into one of
/// `dimensions` buckets.
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimensions: usize,
}

impl HashEmbedding {
    /// Creates a model with `dimensions` buckets (at least one).
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        usize::try_from(hasher.finish() % self.dimensions as u64).unwrap_or_default()
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingModel for HashEmbedding {
    fn name(&self) -> &str {
        "hash-embedding"
    }

    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, StoreError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0_f32; self.dimensions];
                for token in tokenize(text) {
                    vector[self.bucket(&token)] += 1.0;
                }
                vector
            })
            .collect())
    }
}

/// A loader serving documents from memory.
#[derive(Debug, Default)]
pub struct MockDocumentLoader {
    documents: HashMap<String, String>,
    loads: Mutex<Vec<String>>,
}

impl MockDocumentLoader {
    /// Creates a loader with no documents.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `text` for `source`.
    #[must_use]
    pub fn with_document(mut self, source: impl Into<String>, text: impl Into<String>) -> Self {
        self.documents.insert(source.into(), text.into());
        self
    }

    /// Returns the sources requested so far.
    #[must_use]
    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().clone()
    }
}

#[async_trait]
impl DocumentLoader for MockDocumentLoader {
    async fn load(&self, source: &str, _source_type: &str) -> Result<String> {
        self.loads.lock().push(source.to_string());
        self.documents
            .get(source)
            .cloned()
            .ok_or_else(|| RagflowError::load(source, "no such document"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Metadata;

    #[tokio::test]
    async fn test_mock_agent_records_requests() {
        let agent: MockAgent<String, usize> = MockAgent::new("len", |s: &String| Ok(s.len()));

        assert_eq!(agent.run("abc".to_string()).await.unwrap(), 3);
        assert_eq!(agent.call_count(), 1);
        assert_eq!(agent.requests(), vec!["abc".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_agent() {
        let agent: MockAgent<String, String> = MockAgent::failing("broken", "boom");
        let err = agent.run("x".to_string()).await.unwrap_err();
        assert_eq!(err, AgentError::failed("broken", "boom"));
    }

    #[tokio::test]
    async fn test_mock_reranker_reverses_and_truncates() {
        let reranker = MockReranker::reversing();
        let contexts: Vec<Context> = ["a", "b", "c"]
            .iter()
            .map(|id| Context::new(*id, *id, Metadata::new()))
            .collect();

        let reranked = reranker.rerank("q", &contexts, 2).await.unwrap();
        let ids: Vec<&str> = reranked.contexts.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(reranked.scores.len(), 2);
        assert_eq!(reranker.calls()[0].ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_hash_embedding_is_deterministic() {
        let model = HashEmbedding::new(8);
        let texts = vec!["Battery life".to_string(), "battery LIFE".to_string()];
        let vectors = model.embed(&texts).await.unwrap();

        assert_eq!(vectors[0], vectors[1]);
        assert_eq!(vectors[0].iter().sum::<f32>(), 2.0);
    }

    #[tokio::test]
    async fn test_mock_loader_missing_document() {
        let loader = MockDocumentLoader::new().with_document("a.md", "# A");
        assert_eq!(loader.load("a.md", "md").await.unwrap(), "# A");

        let err = loader.load("b.md", "md").await.unwrap_err();
        assert_eq!(err.kind(), "load");
        assert_eq!(loader.loads(), vec!["a.md", "b.md"]);
    }
}

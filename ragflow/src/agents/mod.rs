//! Agent capability interface.
//!
//! Every text generation or classification collaborator (jargon detection,
//! editing, summarization, extraction, decomposition, compression, answer
//! synthesis) is an implementation of the single [`Agent`] trait. The
//! pipelines only ever see the trait, usually wrapped in a [`GuardedAgent`]
//! that adds a deadline, retries and the fallback policy.

mod guard;
mod retry;
mod types;

pub use guard::{AgentPolicy, GuardedAgent};
pub use retry::{with_retry, BackoffStrategy, JitterStrategy, RetryConfig, RetryState};
pub use types::{
    Answer, AnswerRequest, CompressionRequest, DecomposedQueries, DecompositionRequest,
    DetectionRequest, EditRequest, EditedMessage, ExtractedContexts, ExtractedJargon,
    ExtractedJargons, ExtractionRequest, PotentialJargon, PotentialJargons, Summary,
    SummaryRequest,
};

use crate::errors::AgentError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// A fallible request/response collaborator.
#[async_trait]
pub trait Agent<Req, Resp>: Send + Sync
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Returns the name used in logs and errors.
    fn name(&self) -> &str;

    /// Runs the agent on one request.
    async fn run(&self, request: Req) -> Result<Resp, AgentError>;
}

/// Shared handle to an agent.
pub type SharedAgent<Req, Resp> = Arc<dyn Agent<Req, Resp>>;

/// Detects candidate jargon in a message. `None` means the agent produced nothing.
pub type DetectorAgent = SharedAgent<DetectionRequest, Option<PotentialJargons>>;
/// Rewrites a message using jargon knowledge.
pub type EditorAgent = SharedAgent<EditRequest, EditedMessage>;
/// Summarizes one context.
pub type SummarizerAgent = SharedAgent<SummaryRequest, Summary>;
/// Extracts jargon from one context.
pub type ExtractorAgent = SharedAgent<ExtractionRequest, Option<ExtractedJargons>>;
/// Splits a message into sub-queries. `None` means the agent produced nothing.
pub type DecomposerAgent = SharedAgent<DecompositionRequest, Option<DecomposedQueries>>;
/// Extracts the query-relevant parts of one context.
pub type CompressorAgent = SharedAgent<CompressionRequest, ExtractedContexts>;
/// Synthesizes the final answer.
pub type AnswerAgent = SharedAgent<AnswerRequest, Answer>;

/// A closure-based agent.
pub struct FnAgent<F> {
    name: String,
    func: F,
}

impl<F> FnAgent<F> {
    /// Creates a new closure-based agent.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnAgent<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnAgent").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<Req, Resp, F> Agent<Req, Resp> for FnAgent<F>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    F: Fn(Req) -> Result<Resp, AgentError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, request: Req) -> Result<Resp, AgentError> {
        (self.func)(request)
    }
}

//! # Ragflow
//!
//! Retrieval-augmented question answering over ingested documents.
//!
//! Ragflow is made of two pipelines:
//!
//! - **Ingestion**: load a document, split it into markdown-aware chunks,
//!   summarize each chunk, combine summaries with their chunks and extract
//!   jargon into a full-text searchable store.
//! - **Query**: clarify jargon in the user message, decompose it into
//!   sub-queries, retrieve and rerank contexts, compress them and synthesize
//!   an answer.
//!
//! Language models, context stores, rerankers and embedding models are
//! injected behind traits, so any backend can be plugged in.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ragflow::prelude::*;
//!
//! let retrieval = RetrievalSubflow::new(store).with_reranker(reranker);
//! let pipeline = QueryPipeline::new(answer_agent)
//!     .with_decomposer(decomposer)
//!     .with_retrieval(retrieval);
//!
//! let answer = pipeline.run("How long does the battery last?").await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod agents;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod ingest;
pub mod observability;
pub mod pipeline;
pub mod state;
pub mod stores;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agents::{
        Agent, AgentPolicy, AnswerAgent, CompressorAgent, DecomposerAgent, DetectorAgent,
        EditorAgent, ExtractorAgent, FnAgent, GuardedAgent, RetryConfig, SummarizerAgent,
    };
    pub use crate::config::{IngestionConfig, PairingMode, QueryConfig, RagflowConfig};
    pub use crate::core::{Context, JargonRecord, Metadata};
    pub use crate::errors::{AgentError, RagflowError, StateConflictError, StoreError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::ingest::{Chunker, DocumentLoader, FsDocumentLoader, MarkdownChunker};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        ContextTiers, IngestionPipeline, JargonSubflow, QueryOutcome, QueryPipeline,
        RetrievalSubflow,
    };
    pub use crate::state::{IngestionState, QueryState};
    pub use crate::stores::{
        ContextStore, EmbeddingModel, InMemoryContextStore, JargonStore, Reranker, SearchMethod,
    };
}

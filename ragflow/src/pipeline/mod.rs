//! Ingestion and query pipelines.
//!
//! [`IngestionPipeline`] turns a document into context tiers and jargon
//! records. [`QueryPipeline`] answers a message, optionally running the
//! [`JargonSubflow`] and [`RetrievalSubflow`] first.

mod failure;
mod ingestion;
mod jargon;
mod monitor;
mod query;
mod retrieval;


pub use failure::{run_batch, BatchOutcome, ItemFailure, StageFailure};
pub use ingestion::{combine, ContextTiers, IngestionAborted, IngestionOutcome, IngestionPipeline, IngestionReport};
pub use jargon::{render_knowledge, JargonSubflow};
pub use query::{QueryOutcome, QueryPipeline};
pub use retrieval::{RetrievalReport, RetrievalSubflow};

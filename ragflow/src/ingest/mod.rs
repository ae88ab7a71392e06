//! Document loading and chunking for the ingestion pipeline.

mod chunker;
mod loader;

pub use chunker::{Chunker, MarkdownChunker};
pub use loader::{DocumentLoader, FsDocumentLoader};

//! Write-once state of an ingestion run.

use super::Slot;
use crate::core::{Context, JargonRecord};
use crate::errors::StateConflictError;
use serde::Serialize;

/// State of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionState {
    source: String,
    source_type: String,
    /// Written by the load stage.
    text: Slot<String>,
    /// Written by the chunk stage.
    contexts: Slot<Vec<Context>>,
    /// Written by the enrich stage.
    enriched_contexts: Slot<Vec<Context>>,
    /// Written by the combine stage.
    longterm_contexts: Slot<Vec<Context>>,
    /// Written by the extract stage.
    jargon_records: Slot<Vec<JargonRecord>>,
}

impl IngestionState {
    /// Creates the state for one source document.
    #[must_use]
    pub fn new(source: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_type: source_type.into(),
            text: Slot::new("text"),
            contexts: Slot::new("contexts"),
            enriched_contexts: Slot::new("enriched_contexts"),
            longterm_contexts: Slot::new("longterm_contexts"),
            jargon_records: Slot::new("jargon_records"),
        }
    }

    /// Where the document was loaded from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Loader hint such as `markdown`.
    #[must_use]
    pub fn source_type(&self) -> &str {
        &self.source_type
    }

    /// The loaded document text.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.get().map(String::as_str)
    }

    /// Raw chunks in document order.
    #[must_use]
    pub fn contexts(&self) -> Option<&[Context]> {
        self.contexts.get().map(Vec::as_slice)
    }

    /// One summary per successfully summarized chunk.
    #[must_use]
    pub fn enriched_contexts(&self) -> Option<&[Context]> {
        self.enriched_contexts.get().map(Vec::as_slice)
    }

    /// Summary followed by chunk, for every paired chunk.
    #[must_use]
    pub fn longterm_contexts(&self) -> Option<&[Context]> {
        self.longterm_contexts.get().map(Vec::as_slice)
    }

    /// Jargon records that passed the evidence check.
    #[must_use]
    pub fn jargon_records(&self) -> Option<&[JargonRecord]> {
        self.jargon_records.get().map(Vec::as_slice)
    }

    pub(crate) fn set_text(&mut self, text: String) -> Result<(), StateConflictError> {
        self.text.set(text)
    }

    pub(crate) fn set_contexts(&mut self, contexts: Vec<Context>) -> Result<(), StateConflictError> {
        self.contexts.set(contexts)
    }

    pub(crate) fn set_enriched_contexts(&mut self, contexts: Vec<Context>) -> Result<(), StateConflictError> {
        self.enriched_contexts.set(contexts)
    }

    pub(crate) fn set_longterm_contexts(&mut self, contexts: Vec<Context>) -> Result<(), StateConflictError> {
        self.longterm_contexts.set(contexts)
    }

    pub(crate) fn set_jargon_records(&mut self, records: Vec<JargonRecord>) -> Result<(), StateConflictError> {
        self.jargon_records.set(records)
    }
}

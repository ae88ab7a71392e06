//! Jargon records extracted during ingestion.

use super::Metadata;
use serde::{Deserialize, Serialize};

/// One extracted jargon, acronym or proper-noun occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JargonRecord {
    /// Record identifier.
    pub id: String,
    /// Surface form of the term.
    pub jargon: String,
    /// Verbatim excerpt from the source context.
    pub evidence: String,
    /// Short explanation derived from the evidence.
    pub explanation: String,
    /// Metadata inherited from the source context.
    #[serde(default)]
    pub metadata: Metadata,
}

impl JargonRecord {
    /// Creates a record with a fresh random id.
    #[must_use]
    pub fn new(
        jargon: impl Into<String>,
        evidence: impl Into<String>,
        explanation: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            jargon: jargon.into(),
            evidence: evidence.into(),
            explanation: explanation.into(),
            metadata,
        }
    }

    /// Sets the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Renders the record as one numbered entry of a knowledge block.
    #[must_use]
    pub fn render(&self, number: usize) -> String {
        format!(
            "{number}: {}\nEvidence: {}\nExplanation: {}",
            self.jargon, self.evidence, self.explanation
        )
    }
}

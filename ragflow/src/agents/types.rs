//! Request and response types for the agents the pipelines call.

use serde::{Deserialize, Serialize};

/// Input for jargon detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRequest {
    /// The user's message.
    pub message: String,
}

/// A candidate term with the detector's confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotentialJargon {
    /// The candidate term.
    pub jargon: String,
    /// Detector confidence.
    pub confidence: f64,
}

/// Output of jargon detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PotentialJargons {
    /// Detected candidates.
    pub jargons: Vec<PotentialJargon>,
}

impl PotentialJargons {
    /// Returns the terms whose confidence is strictly above `threshold`.
    #[must_use]
    pub fn above(&self, threshold: f64) -> Vec<String> {
        self.jargons
            .iter()
            .filter(|j| j.confidence > threshold)
            .map(|j| j.jargon.clone())
            .collect()
    }
}

/// Input for message editing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRequest {
    /// Rendered jargon knowledge block.
    pub knowledge: String,
    /// The message to rewrite.
    pub message: String,
}

/// Output of message editing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditedMessage {
    /// The rewritten message. Empty means "no edit".
    pub edited_message: String,
}

impl EditedMessage {
    /// Fallback used when the editor cannot answer: leaves the message as is.
    #[must_use]
    pub fn fallback() -> Self {
        Self::default()
    }
}

/// Input for context summarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRequest {
    /// The context text.
    pub context: String,
}

/// Output of context summarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// A short summary of the context.
    pub summary: String,
}

impl Summary {
    /// Fallback used when the summarizer cannot answer.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            summary: "The information is not proper for summarization.".to_string(),
        }
    }
}

/// Input for jargon extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    /// The context text.
    pub context: String,
}

/// One extracted term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedJargon {
    /// The term.
    pub jargon: String,
    /// Excerpt that supports the term.
    pub evidence: String,
    /// Short explanation based on the evidence.
    pub explanation: String,
}

/// Output of jargon extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedJargons {
    /// Extracted terms.
    pub jargons: Vec<ExtractedJargon>,
}

/// Input for query decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionRequest {
    /// The (possibly edited) message.
    pub message: String,
}

/// Output of query decomposition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecomposedQueries {
    /// Independently searchable sub-queries.
    pub sub_queries: Vec<String>,
}

/// Input for context compression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionRequest {
    /// One retrieved context.
    pub context: String,
    /// The query the context should answer.
    pub query: String,
}

/// Output of context compression.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContexts {
    /// Verbatim extracts relevant to the query.
    pub extracted_contexts: Vec<String>,
}

impl ExtractedContexts {
    /// Fallback used when the compressor cannot answer.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            extracted_contexts: vec!["error".to_string()],
        }
    }

    /// Returns true when nothing usable was extracted.
    #[must_use]
    pub fn is_unusable(&self) -> bool {
        self.extracted_contexts.iter().all(|e| e.trim().is_empty())
            || (self.extracted_contexts.len() == 1 && self.extracted_contexts[0] == "error")
    }
}

/// Input for answer synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRequest {
    /// Retrieved knowledge, absent when retrieval did not run.
    pub prior_knowledge: Option<String>,
    /// The (possibly edited) message.
    pub message: String,
}

/// Output of answer synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// The answer text.
    pub answer: String,
}

impl Answer {
    /// Fallback used when the answer agent cannot answer.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            answer: "Could you be more specific?".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_filter_is_strict() {
        let detected = PotentialJargons {
            jargons: vec![
                PotentialJargon { jargon: "t1".into(), confidence: 0.9 },
                PotentialJargon { jargon: "t2".into(), confidence: 0.4 },
                PotentialJargon { jargon: "t3".into(), confidence: 0.6 },
                PotentialJargon { jargon: "t4".into(), confidence: 0.5 },
            ],
        };

        assert_eq!(detected.above(0.5), vec!["t1".to_string(), "t3".to_string()]);
    }

    #[test]
    fn test_extracted_contexts_unusable() {
        assert!(ExtractedContexts::fallback().is_unusable());
        assert!(ExtractedContexts::default().is_unusable());
        assert!(!ExtractedContexts {
            extracted_contexts: vec!["The vacuum runs 60 minutes.".into()]
        }
        .is_unusable());
    }

    #[test]
    fn test_extraction_response_deserializes() {
        let json = r#"{"jargons":[{"jargon":"LLM","evidence":"LLM, large language model","explanation":"a model"}]}"#;
        let parsed: ExtractedJargons = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.jargons[0].jargon, "LLM");
    }
}

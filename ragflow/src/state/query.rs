//! Write-once state of a query run.

use super::Slot;
use crate::core::{join_texts, Context, JargonRecord};
use crate::errors::StateConflictError;
use serde::Serialize;

/// State of one query run.
///
/// The working message and context are derived, never stored:
/// [`QueryState::message`] prefers a non-empty edit over the original, and
/// [`QueryState::context`] joins the most refined context list available.
#[derive(Debug, Clone, Serialize)]
pub struct QueryState {
    original_message: String,
    /// Jargon subflow.
    potential_jargons: Slot<Vec<String>>,
    /// Jargon subflow.
    jargon_contexts: Slot<Vec<JargonRecord>>,
    /// Jargon subflow.
    jargon_knowledge: Slot<String>,
    /// Jargon subflow.
    edited_message: Slot<String>,
    /// Decompose stage. `None` inside means the decomposer returned nothing.
    sub_queries: Slot<Option<Vec<String>>>,
    /// Retrieval subflow.
    retrieved_contexts: Slot<Vec<Context>>,
    /// Retrieval subflow.
    reranked_contexts: Slot<Vec<Context>>,
    /// Compress stage.
    compressed_contexts: Slot<Vec<Context>>,
    /// Answer stage.
    answer: Slot<String>,
}

impl QueryState {
    /// Creates the state, capturing the original message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            original_message: message.into(),
            potential_jargons: Slot::new("potential_jargons"),
            jargon_contexts: Slot::new("jargon_contexts"),
            jargon_knowledge: Slot::new("jargon_knowledge"),
            edited_message: Slot::new("edited_message"),
            sub_queries: Slot::new("sub_queries"),
            retrieved_contexts: Slot::new("retrieved_contexts"),
            reranked_contexts: Slot::new("reranked_contexts"),
            compressed_contexts: Slot::new("compressed_contexts"),
            answer: Slot::new("answer"),
        }
    }

    /// The message as first received.
    #[must_use]
    pub fn original_message(&self) -> &str {
        &self.original_message
    }

    /// The current working message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self.edited_message.get() {
            Some(edited) if !edited.trim().is_empty() => edited,
            _ => &self.original_message,
        }
    }

    /// The working context blob, `None` until retrieval has run.
    #[must_use]
    pub fn context(&self) -> Option<String> {
        self.final_contexts().map(join_texts)
    }

    /// The most refined context list: compressed, reranked, then retrieved.
    #[must_use]
    pub fn final_contexts(&self) -> Option<&[Context]> {
        self.compressed_contexts
            .get()
            .or_else(|| self.reranked_contexts.get())
            .or_else(|| self.retrieved_contexts.get())
            .map(Vec::as_slice)
    }

    /// Detected terms that passed the confidence threshold.
    #[must_use]
    pub fn potential_jargons(&self) -> Option<&[String]> {
        self.potential_jargons.get().map(Vec::as_slice)
    }

    /// Jargon records found for the detected terms.
    #[must_use]
    pub fn jargon_contexts(&self) -> Option<&[JargonRecord]> {
        self.jargon_contexts.get().map(Vec::as_slice)
    }

    /// The rendered knowledge block handed to the editor.
    #[must_use]
    pub fn jargon_knowledge(&self) -> Option<&str> {
        self.jargon_knowledge.get().map(String::as_str)
    }

    /// The editor's rewrite, as returned, even if blank.
    #[must_use]
    pub fn edited_message(&self) -> Option<&str> {
        self.edited_message.get().map(String::as_str)
    }

    /// Sub-queries from the decomposer. `None` if it did not run or returned nothing.
    #[must_use]
    pub fn sub_queries(&self) -> Option<&[String]> {
        self.sub_queries.get().and_then(Option::as_deref)
    }

    /// Queries for retrieval: non-empty sub-queries, else the working message.
    #[must_use]
    pub fn retrieval_queries(&self) -> Vec<String> {
        match self.sub_queries() {
            Some(queries) if !queries.is_empty() => queries.to_vec(),
            _ => vec![self.message().to_string()],
        }
    }

    /// Deduplicated search hits in first-seen order.
    #[must_use]
    pub fn retrieved_contexts(&self) -> Option<&[Context]> {
        self.retrieved_contexts.get().map(Vec::as_slice)
    }

    /// Contexts in reranker order, `None` without a successful rerank.
    #[must_use]
    pub fn reranked_contexts(&self) -> Option<&[Context]> {
        self.reranked_contexts.get().map(Vec::as_slice)
    }

    /// Compressed contexts, unusable ones dropped.
    #[must_use]
    pub fn compressed_contexts(&self) -> Option<&[Context]> {
        self.compressed_contexts.get().map(Vec::as_slice)
    }

    /// The final answer.
    #[must_use]
    pub fn answer(&self) -> Option<&str> {
        self.answer.get().map(String::as_str)
    }

    pub(crate) fn set_potential_jargons(&mut self, terms: Vec<String>) -> Result<(), StateConflictError> {
        self.potential_jargons.set(terms)
    }

    pub(crate) fn set_jargon_contexts(&mut self, records: Vec<JargonRecord>) -> Result<(), StateConflictError> {
        self.jargon_contexts.set(records)
    }

    pub(crate) fn set_jargon_knowledge(&mut self, knowledge: String) -> Result<(), StateConflictError> {
        self.jargon_knowledge.set(knowledge)
    }

    pub(crate) fn set_edited_message(&mut self, message: String) -> Result<(), StateConflictError> {
        self.edited_message.set(message)
    }

    pub(crate) fn set_sub_queries(&mut self, queries: Option<Vec<String>>) -> Result<(), StateConflictError> {
        self.sub_queries.set(queries)
    }

    pub(crate) fn set_retrieved_contexts(&mut self, contexts: Vec<Context>) -> Result<(), StateConflictError> {
        self.retrieved_contexts.set(contexts)
    }

    pub(crate) fn set_reranked_contexts(&mut self, contexts: Vec<Context>) -> Result<(), StateConflictError> {
        self.reranked_contexts.set(contexts)
    }

    pub(crate) fn set_compressed_contexts(&mut self, contexts: Vec<Context>) -> Result<(), StateConflictError> {
        self.compressed_contexts.set(contexts)
    }

    pub(crate) fn set_answer(&mut self, answer: String) -> Result<(), StateConflictError> {
        self.answer.set(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Metadata;
    use pretty_assertions::assert_eq;

    fn ctx(id: &str, text: &str) -> Context {
        Context::new(id, text, Metadata::new())
    }

    #[test]
    fn test_original_message_is_captured() {
        let mut state = QueryState::new("what is RAG?");
        state
            .set_edited_message("what is retrieval augmented generation?".into())
            .unwrap();

        assert_eq!(state.original_message(), "what is RAG?");
        assert_eq!(state.message(), "what is retrieval augmented generation?");
    }

    #[test]
    fn test_empty_edit_keeps_original() {
        let mut state = QueryState::new("hello");
        state.set_edited_message(String::new()).unwrap();

        assert_eq!(state.message(), "hello");
    }

    #[test]
    fn test_context_absent_until_retrieval() {
        let state = QueryState::new("q");
        assert_eq!(state.context(), None);
    }

    #[test]
    fn test_context_prefers_most_refined_list() {
        let mut state = QueryState::new("q");
        state
            .set_retrieved_contexts(vec![ctx("1", "a"), ctx("2", "b")])
            .unwrap();
        assert_eq!(state.context().as_deref(), Some("a\n\nb"));

        state.set_reranked_contexts(vec![ctx("2", "b"), ctx("1", "a")]).unwrap();
        assert_eq!(state.context().as_deref(), Some("b\n\na"));

        state.set_compressed_contexts(vec![ctx("2", "b'")]).unwrap();
        assert_eq!(state.context().as_deref(), Some("b'"));
    }

    #[test]
    fn test_retrieval_queries() {
        let mut state = QueryState::new("q");
        assert_eq!(state.retrieval_queries(), vec!["q".to_string()]);

        state.set_sub_queries(Some(vec!["a".into(), "b".into()])).unwrap();
        assert_eq!(state.retrieval_queries(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_null_or_empty_sub_queries_fall_back_to_message() {
        let mut state = QueryState::new("q");
        state.set_sub_queries(None).unwrap();
        assert_eq!(state.sub_queries(), None);
        assert_eq!(state.retrieval_queries(), vec!["q".to_string()]);

        let mut state = QueryState::new("q");
        state.set_sub_queries(Some(Vec::new())).unwrap();
        assert_eq!(state.retrieval_queries(), vec!["q".to_string()]);
    }

    #[test]
    fn test_answer_is_write_once() {
        let mut state = QueryState::new("q");
        state.set_answer("a".into()).unwrap();
        assert!(state.set_answer("b".into()).is_err());
        assert_eq!(state.answer(), Some("a"));
    }
}

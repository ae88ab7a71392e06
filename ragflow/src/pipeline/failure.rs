//! Per-item and per-stage failure accounting.

use crate::core::Context;
use crate::errors::RagflowError;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// One item of a batch that failed and was left out of the stage output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Stage that processed the item.
    pub stage: String,
    /// Position of the item in the stage input.
    pub index: usize,
    /// Id of the offending context.
    pub context_id: String,
    /// Error message.
    pub error: String,
    /// Error class, see [`RagflowError::kind`].
    pub kind: String,
    /// When the failure was recorded.
    pub occurred_at: DateTime<Utc>,
    /// The offending context.
    pub context: Context,
}

impl ItemFailure {
    /// Records a failure of `context` at `index`.
    #[must_use]
    pub fn new(stage: impl Into<String>, index: usize, context: &Context, error: &RagflowError) -> Self {
        Self {
            stage: stage.into(),
            index,
            context_id: context.id.clone(),
            error: error.to_string(),
            kind: error.kind().to_string(),
            occurred_at: Utc::now(),
            context: context.clone(),
        }
    }
}

/// An optional query stage that failed; the run went on without its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Stage name.
    pub stage: String,
    /// Error message.
    pub error: String,
    /// Error class.
    pub kind: String,
    /// When the failure was recorded.
    pub occurred_at: DateTime<Utc>,
}

impl StageFailure {
    /// Records a failure of `stage`.
    #[must_use]
    pub fn new(stage: impl Into<String>, error: &RagflowError) -> Self {
        Self {
            stage: stage.into(),
            error: error.to_string(),
            kind: error.kind().to_string(),
            occurred_at: Utc::now(),
        }
    }
}

/// Result of running one fallible operation per item.
#[derive(Debug, Clone)]
pub struct BatchOutcome<T> {
    /// Successful outputs with their input index, in input order.
    pub succeeded: Vec<(usize, T)>,
    /// Failed items, in input order.
    pub failures: Vec<ItemFailure>,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> BatchOutcome<T> {
    /// Returns true if every item succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Drops the indices, keeping input order.
    #[must_use]
    pub fn into_values(self) -> Vec<T> {
        self.succeeded.into_iter().map(|(_, value)| value).collect()
    }
}

/// Runs `op` on every context with at most `concurrency` calls in flight.
///
/// Results are reassembled in input order, and a failure never cancels
/// sibling items.
pub async fn run_batch<'a, T, F, Fut>(stage: &str, items: &'a [Context], concurrency: usize, op: F) -> BatchOutcome<T>
where
    F: Fn(&'a Context) -> Fut,
    Fut: Future<Output = Result<T, RagflowError>>,
{
    let results: Vec<Result<T, RagflowError>> = stream::iter(items.iter().map(&op))
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut outcome = BatchOutcome::default();
    for (index, (context, result)) in items.iter().zip(results).enumerate() {
        match result {
            Ok(value) => outcome.succeeded.push((index, value)),
            Err(err) => {
                tracing::warn!(stage, index, context_id = %context.id, error = %err, "Item failed");
                outcome.failures.push(ItemFailure::new(stage, index, context, &err));
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Metadata;
    use crate::errors::AgentError;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn contexts(n: usize) -> Vec<Context> {
        (0..n)
            .map(|i| Context::new(format!("c{i}"), format!("text {i}"), Metadata::new()))
            .collect()
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let items = contexts(5);
        let outcome = run_batch("enrich", &items, 5, |c| async move {
            // Later items finish first.
            let n: u64 = c.id[1..].parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(5 * (5 - n))).await;
            Ok(c.id.clone())
        })
        .await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.into_values(), vec!["c0", "c1", "c2", "c3", "c4"]);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let items = contexts(4);
        let outcome = run_batch("extract", &items, 2, |c| async move {
            if c.id == "c1" || c.id == "c3" {
                Err(RagflowError::from(AgentError::failed("extractor", "boom")))
            } else {
                Ok(c.text.clone())
            }
        })
        .await;

        assert_eq!(outcome.succeeded.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.failures[0].index, 1);
        assert_eq!(outcome.failures[0].context_id, "c1");
        assert_eq!(outcome.failures[0].stage, "extract");
        assert_eq!(outcome.failures[0].kind, "agent");
        assert_eq!(outcome.failures[1].context.id, "c3");
    }

    #[test]
    fn test_stage_failure() {
        let err = RagflowError::from(AgentError::timeout("decomposer", 10));
        let failure = StageFailure::new("decompose", &err);
        assert_eq!(failure.kind, "agent_timeout");
        assert!(failure.error.contains("decomposer"));
    }
}

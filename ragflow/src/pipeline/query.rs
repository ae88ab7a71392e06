//! The query pipeline: jargon, decompose, retrieve, compress, answer.

use super::failure::{run_batch, ItemFailure, StageFailure};
use super::jargon::JargonSubflow;
use super::monitor::StageMonitor;
use super::retrieval::RetrievalSubflow;
use crate::agents::{
    Answer, AnswerAgent, AnswerRequest, CompressionRequest, CompressorAgent, DecomposedQueries,
    DecomposerAgent, DecompositionRequest, ExtractedContexts, GuardedAgent,
};
use crate::config::QueryConfig;
use crate::core::Context;
use crate::errors::{RagflowError, Result};
use crate::events::{NoOpEventSink, SharedEventSink, QUERY_COMPLETED, QUERY_STARTED, STAGE_COMPLETED};
use crate::observability::SpanTimer;
use crate::state::QueryState;
use serde_json::{json, Value};
use std::sync::Arc;

const JARGON: &str = "jargon";
const DECOMPOSE: &str = "decompose";
const RETRIEVE: &str = "retrieve";
const RERANK: &str = "rerank";
const COMPRESS: &str = "compress";
const ANSWER: &str = "answer";

/// A finished query run.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// Run identifier, also carried by the run's events.
    pub run_id: String,
    /// Final state.
    pub state: QueryState,
    /// Optional stages that failed. The answer was produced without them.
    pub stage_failures: Vec<StageFailure>,
    /// Contexts the compressor failed on.
    pub item_failures: Vec<ItemFailure>,
}

impl QueryOutcome {
    /// Returns the answer.
    #[must_use]
    pub fn answer(&self) -> &str {
        self.state.answer().unwrap_or_default()
    }

    /// Returns true if any optional stage or item failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.stage_failures.is_empty() || !self.item_failures.is_empty()
    }
}

/// Answers a user message, optionally clarifying jargon, decomposing the
/// question, retrieving and compressing context first.
///
/// Stages run in a fixed order and an unset collaborator skips its stage.
/// A failing optional stage is recorded and the run moves on; the answer
/// stage always runs.
#[derive(Debug)]
pub struct QueryPipeline {
    answer: GuardedAgent<AnswerRequest, Answer>,
    jargon: Option<JargonSubflow>,
    decomposer: Option<GuardedAgent<DecompositionRequest, Option<DecomposedQueries>>>,
    retrieval: Option<RetrievalSubflow>,
    compressor: Option<GuardedAgent<CompressionRequest, ExtractedContexts>>,
    config: QueryConfig,
    configured: bool,
    sink: SharedEventSink,
}

impl QueryPipeline {
    /// Creates a pipeline that only answers. The answer agent falls back to
    /// asking the user to be more specific.
    #[must_use]
    pub fn new(answer: AnswerAgent) -> Self {
        let config = QueryConfig::default();
        Self {
            answer: GuardedAgent::new(answer)
                .with_fallback(Answer::fallback())
                .with_call_config(&config.agent),
            jargon: None,
            decomposer: None,
            retrieval: None,
            compressor: None,
            config,
            configured: false,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Enables the jargon stage.
    ///
    /// Once [`with_config`](Self::with_config) has been called, its jargon
    /// and agent settings replace the subflow's own.
    #[must_use]
    pub fn with_jargon(mut self, subflow: JargonSubflow) -> Self {
        let subflow = if self.configured {
            subflow
                .with_config(self.config.jargon.clone())
                .with_call_config(&self.config.agent)
        } else {
            subflow
        };
        self.jargon = Some(subflow);
        self
    }

    /// Enables the decompose stage. The decomposer fails fast.
    #[must_use]
    pub fn with_decomposer(mut self, decomposer: DecomposerAgent) -> Self {
        self.decomposer = Some(GuardedAgent::new(decomposer).with_call_config(&self.config.agent));
        self
    }

    /// Enables the retrieve stage.
    ///
    /// Once [`with_config`](Self::with_config) has been called, its
    /// retrieval settings replace the subflow's own.
    #[must_use]
    pub fn with_retrieval(mut self, subflow: RetrievalSubflow) -> Self {
        let subflow = if self.configured {
            subflow.with_config(self.config.retrieval.clone())
        } else {
            subflow
        };
        self.retrieval = Some(subflow);
        self
    }

    /// Enables the compress stage. A failed compression drops the context.
    #[must_use]
    pub fn with_compressor(mut self, compressor: CompressorAgent) -> Self {
        self.compressor = Some(
            GuardedAgent::new(compressor)
                .with_fallback(ExtractedContexts::fallback())
                .with_call_config(&self.config.agent),
        );
        self
    }

    /// Applies a configuration to the pipeline's agents and to the jargon
    /// and retrieval subflows, whether set before or after this call.
    #[must_use]
    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.answer = self.answer.with_call_config(&config.agent);
        self.decomposer = self.decomposer.map(|d| d.with_call_config(&config.agent));
        self.compressor = self.compressor.map(|c| c.with_call_config(&config.agent));
        self.jargon = self
            .jargon
            .map(|j| j.with_config(config.jargon.clone()).with_call_config(&config.agent));
        self.retrieval = self.retrieval.map(|r| r.with_config(config.retrieval.clone()));
        self.config = config;
        self.configured = true;
        self
    }

    /// Replaces the answer agent wrapper, e.g. to fail fast.
    #[must_use]
    pub fn with_answer_agent(mut self, answer: GuardedAgent<AnswerRequest, Answer>) -> Self {
        self.answer = answer;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: SharedEventSink) -> Self {
        self.sink = sink;
        self
    }

    /// Answers `message`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the answer stage fails.
    pub async fn run(&self, message: &str) -> Result<String> {
        let outcome = self.run_with_state(message).await?;
        Ok(outcome.answer().to_string())
    }

    /// Answers `message` and returns the final state with every recorded
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns an error only if the answer stage fails.
    #[tracing::instrument(skip(self))]
    pub async fn run_with_state(&self, message: &str) -> Result<QueryOutcome> {
        let monitor = StageMonitor::new(self.sink.clone(), "query");
        let mut state = QueryState::new(message);
        let mut stage_failures = Vec::new();
        let mut item_failures = Vec::new();

        monitor.emit(QUERY_STARTED, json!({ "message": message })).await;

        if let Some(subflow) = &self.jargon {
            let timer = monitor.started(JARGON).await;
            let result = Self::detect_jargon(subflow, &mut state).await;
            finish(&monitor, timer, result, &mut stage_failures).await;
        } else {
            monitor.skipped(JARGON, "no jargon subflow").await;
        }

        if let Some(decomposer) = &self.decomposer {
            let timer = monitor.started(DECOMPOSE).await;
            let result = Self::decompose(decomposer, &mut state).await;
            finish(&monitor, timer, result, &mut stage_failures).await;
        } else {
            monitor.skipped(DECOMPOSE, "no decomposer").await;
        }

        if let Some(subflow) = &self.retrieval {
            self.retrieve(&monitor, subflow, &mut state, &mut stage_failures).await;
        } else {
            monitor.skipped(RETRIEVE, "no retrieval subflow").await;
        }

        let has_contexts = state.final_contexts().is_some_and(|contexts| !contexts.is_empty());
        match &self.compressor {
            None => monitor.skipped(COMPRESS, "no compressor").await,
            Some(_) if !has_contexts => monitor.skipped(COMPRESS, "no contexts").await,
            Some(compressor) => {
                let timer = monitor.started(COMPRESS).await;
                let result = self
                    .compress(&monitor, compressor, &mut state, &mut item_failures)
                    .await;
                finish(&monitor, timer, result, &mut stage_failures).await;
            }
        }

        let timer = monitor.started(ANSWER).await;
        if let Err(err) = self.answer_message(&mut state).await {
            monitor.failed(ANSWER, &err).await;
            return Err(err);
        }
        monitor
            .completed(timer, json!({ "with_context": state.context().is_some() }))
            .await;

        monitor
            .emit(
                QUERY_COMPLETED,
                json!({
                    "stage_failures": stage_failures.len(),
                    "item_failures": item_failures.len(),
                }),
            )
            .await;

        Ok(QueryOutcome {
            run_id: monitor.run_id().to_string(),
            state,
            stage_failures,
            item_failures,
        })
    }

    async fn detect_jargon(subflow: &JargonSubflow, state: &mut QueryState) -> Result<Value> {
        subflow.run(state).await?;
        Ok(json!({
            "terms": state.potential_jargons().map_or(0, <[String]>::len),
            "records": state.jargon_contexts().map_or(0, <[_]>::len),
            "edited": state.edited_message().is_some(),
        }))
    }

    async fn decompose(
        decomposer: &GuardedAgent<DecompositionRequest, Option<DecomposedQueries>>,
        state: &mut QueryState,
    ) -> Result<Value> {
        let decomposed = decomposer
            .call(DecompositionRequest {
                message: state.message().to_string(),
            })
            .await?;
        state.set_sub_queries(decomposed.map(|d| d.sub_queries))?;
        Ok(json!({ "sub_queries": state.sub_queries().map_or(0, <[String]>::len) }))
    }

    async fn retrieve(
        &self,
        monitor: &StageMonitor,
        subflow: &RetrievalSubflow,
        state: &mut QueryState,
        failures: &mut Vec<StageFailure>,
    ) {
        let timer = monitor.started(RETRIEVE).await;
        let report = match subflow.run(state).await {
            Ok(report) => report,
            Err(err) => {
                record(monitor, RETRIEVE, &err, failures).await;
                return;
            }
        };
        monitor
            .completed(
                timer,
                json!({ "queries": report.queries, "hits": report.hits, "unique": report.unique }),
            )
            .await;

        if !subflow.has_reranker() {
            monitor.skipped(RERANK, "no reranker").await;
        } else if let Some(err) = report.rerank_error {
            record(monitor, RERANK, &err, failures).await;
        } else {
            monitor
                .emit(
                    STAGE_COMPLETED,
                    json!({ "stage": RERANK, "contexts": report.reranked.unwrap_or_default() }),
                )
                .await;
        }
    }

    async fn compress(
        &self,
        monitor: &StageMonitor,
        compressor: &GuardedAgent<CompressionRequest, ExtractedContexts>,
        state: &mut QueryState,
        item_failures: &mut Vec<ItemFailure>,
    ) -> Result<Value> {
        let contexts: Vec<Context> = state.final_contexts().map(<[Context]>::to_vec).unwrap_or_default();
        let query = state.message().to_string();
        let query = query.as_str();

        let outcome = run_batch(COMPRESS, &contexts, self.config.retrieval.concurrency, |context| async move {
            let extracted = compressor
                .call(CompressionRequest {
                    context: context.text.clone(),
                    query: query.to_string(),
                })
                .await?;
            if extracted.is_unusable() {
                return Ok::<_, RagflowError>(None);
            }
            Ok(Some(context.with_text(extracted.extracted_contexts.join("\n"))))
        })
        .await;

        for failure in &outcome.failures {
            monitor.item_failed(failure).await;
        }
        let failed = outcome.failures.len();
        item_failures.extend(outcome.failures.iter().cloned());

        let compressed: Vec<Context> = outcome.into_values().into_iter().flatten().collect();
        let kept = compressed.len();
        state.set_compressed_contexts(compressed)?;
        Ok(json!({
            "input": contexts.len(),
            "kept": kept,
            "dropped": contexts.len() - kept - failed,
            "failed": failed,
        }))
    }

    async fn answer_message(&self, state: &mut QueryState) -> Result<()> {
        let answer = self
            .answer
            .call(AnswerRequest {
                prior_knowledge: state.context(),
                message: state.message().to_string(),
            })
            .await?;
        state.set_answer(answer.answer)?;
        Ok(())
    }
}

async fn record(monitor: &StageMonitor, stage: &str, error: &RagflowError, failures: &mut Vec<StageFailure>) {
    monitor.failed(stage, error).await;
    failures.push(StageFailure::new(stage, error));
}

async fn finish(monitor: &StageMonitor, timer: SpanTimer, result: Result<Value>, failures: &mut Vec<StageFailure>) {
    match result {
        Ok(data) => monitor.completed(timer, data).await,
        Err(err) => record(monitor, timer.name(), &err, failures).await,
    }
}

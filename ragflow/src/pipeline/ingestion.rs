//! Document ingestion: load, chunk, enrich, combine and extract jargon.

use super::failure::{run_batch, ItemFailure};
use super::monitor::StageMonitor;
use crate::agents::{
    AgentPolicy, ExtractedJargons, ExtractionRequest, ExtractorAgent, GuardedAgent, Summary,
    SummarizerAgent, SummaryRequest,
};
use crate::config::{IngestionConfig, PairingMode};
use crate::core::{Context, JargonRecord};
use crate::errors::RagflowError;
use crate::events::{NoOpEventSink, SharedEventSink, INGESTION_COMPLETED, INGESTION_STARTED};
use crate::ingest::{Chunker, DocumentLoader, FsDocumentLoader, MarkdownChunker};
use crate::state::IngestionState;
use crate::stores::{JargonStore, SharedContextStore};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

const LOAD: &str = "load";
const CHUNK: &str = "chunk";
const STORE_RAW: &str = "store_raw";
const ENRICH: &str = "enrich";
const STORE_ENRICHED: &str = "store_enriched";
const COMBINE: &str = "combine";
const STORE_LONGTERM: &str = "store_longterm";
const EXTRACT: &str = "extract";
const STORE_JARGONS: &str = "store_jargons";

/// The three context tiers an ingestion run writes to.
#[derive(Debug, Clone)]
pub struct ContextTiers {
    /// Chunks as split from the document.
    pub raw: SharedContextStore,
    /// One summary per chunk.
    pub enriched: SharedContextStore,
    /// Summary followed by the original chunk.
    pub longterm: SharedContextStore,
}

/// Counts and isolated failures of one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionReport {
    /// Run identifier, also carried by the run's events.
    pub run_id: String,
    /// Raw contexts produced by chunking.
    pub contexts: usize,
    /// Contexts that were summarized.
    pub enriched: usize,
    /// Long-term contexts produced by combining.
    pub longterm: usize,
    /// Jargon records stored.
    pub jargon_records: usize,
    /// Chunks the summarizer failed on.
    pub enrich_failures: Vec<ItemFailure>,
    /// Chunks the extractor failed on.
    pub extract_failures: Vec<ItemFailure>,
    /// Raw contexts left out of the long-term tier for lack of a matching summary.
    pub unpaired: usize,
    /// Extracted jargon dropped for missing or unverifiable evidence.
    pub discarded_jargons: usize,
}

impl IngestionReport {
    /// Returns true if any item failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.enrich_failures.is_empty() || !self.extract_failures.is_empty()
    }
}

/// A completed ingestion run.
#[derive(Debug, Clone)]
pub struct IngestionOutcome {
    /// Final state.
    pub state: IngestionState,
    /// Counts and item failures.
    pub report: IngestionReport,
}

/// An ingestion run stopped by a fatal stage error.
///
/// Carries everything produced before the failure, including the item
/// failures already collected.
#[derive(Debug, Error)]
#[error("Ingestion aborted at stage '{stage}': {error}")]
pub struct IngestionAborted {
    /// The stage that failed.
    pub stage: String,
    /// The error.
    #[source]
    pub error: RagflowError,
    /// State as of the failure.
    pub state: IngestionState,
    /// Report as of the failure.
    pub report: IngestionReport,
}

struct StageError {
    stage: &'static str,
    error: RagflowError,
}

fn at<E: Into<RagflowError>>(stage: &'static str) -> impl FnOnce(E) -> StageError {
    move |e| StageError {
        stage,
        error: e.into(),
    }
}

/// Returns true if extracted evidence is usable for `context_text`.
fn is_valid_evidence(evidence: &str, context_text: &str, require_literal: bool) -> bool {
    let evidence = evidence.trim();
    if evidence.is_empty() || evidence.eq_ignore_ascii_case("none") {
        return false;
    }
    !require_literal || context_text.contains(evidence)
}

/// Turns one source document into raw, enriched and long-term contexts plus
/// jargon records, persisting each tier as it is produced.
///
/// Load, chunk and every store write are fatal on failure. Summarization
/// and extraction failures are isolated per chunk and reported.
#[derive(Debug)]
pub struct IngestionPipeline {
    tiers: ContextTiers,
    jargon_store: JargonStore,
    summarizer: GuardedAgent<SummaryRequest, Summary>,
    extractor: GuardedAgent<ExtractionRequest, Option<ExtractedJargons>>,
    loader: Arc<dyn DocumentLoader>,
    chunker: Arc<dyn Chunker>,
    custom_chunker: bool,
    config: IngestionConfig,
    sink: SharedEventSink,
}

impl IngestionPipeline {
    /// Creates a pipeline with the default configuration.
    ///
    /// The summarizer falls back to a fixed summary; the extractor fails fast.
    #[must_use]
    pub fn new(
        tiers: ContextTiers,
        jargon_store: JargonStore,
        summarizer: SummarizerAgent,
        extractor: ExtractorAgent,
    ) -> Self {
        let config = IngestionConfig::default();
        Self {
            tiers,
            jargon_store,
            summarizer: GuardedAgent::new(summarizer)
                .with_fallback(Summary::fallback())
                .with_call_config(&config.agent),
            extractor: GuardedAgent::new(extractor).with_call_config(&config.agent),
            loader: Arc::new(FsDocumentLoader::new()),
            chunker: Arc::new(MarkdownChunker::new(config.max_tokens, config.overlap)),
            custom_chunker: false,
            config,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Applies a configuration.
    ///
    /// The markdown chunker is rebuilt from the chunking settings unless a
    /// chunker was installed with [`with_chunker`](Self::with_chunker).
    #[must_use]
    pub fn with_config(mut self, config: IngestionConfig) -> Self {
        self.summarizer = self.summarizer.with_call_config(&config.agent);
        self.extractor = self.extractor.with_call_config(&config.agent);
        if !self.custom_chunker {
            self.chunker = Arc::new(
                MarkdownChunker::new(config.max_tokens, config.overlap)
                    .with_min_chunk_tokens(config.min_chunk_tokens),
            );
        }
        self.config = config;
        self
    }

    /// Sets the summarizer failure policy.
    #[must_use]
    pub fn with_summarizer_policy(mut self, policy: AgentPolicy<Summary>) -> Self {
        self.summarizer = self.summarizer.with_policy(policy);
        self
    }

    /// Sets the document loader.
    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Sets the chunker.
    #[must_use]
    pub fn with_chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = chunker;
        self.custom_chunker = true;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: SharedEventSink) -> Self {
        self.sink = sink;
        self
    }

    /// Ingests one document.
    ///
    /// # Errors
    ///
    /// Returns [`IngestionAborted`] when a fatal stage fails.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, source: &str, source_type: &str) -> Result<IngestionOutcome, IngestionAborted> {
        let monitor = StageMonitor::new(self.sink.clone(), "ingestion");
        let mut state = IngestionState::new(source, source_type);
        let mut report = IngestionReport {
            run_id: monitor.run_id().to_string(),
            ..IngestionReport::default()
        };

        monitor
            .emit(INGESTION_STARTED, json!({ "source": source, "source_type": source_type }))
            .await;

        match self.execute(&monitor, &mut state, &mut report).await {
            Ok(()) => {
                monitor
                    .emit(
                        INGESTION_COMPLETED,
                        json!({
                            "contexts": report.contexts,
                            "enriched": report.enriched,
                            "longterm": report.longterm,
                            "jargon_records": report.jargon_records,
                            "item_failures": report.enrich_failures.len() + report.extract_failures.len(),
                        }),
                    )
                    .await;
                Ok(IngestionOutcome { state, report })
            }
            Err(StageError { stage, error }) => {
                monitor.failed(stage, &error).await;
                Err(IngestionAborted {
                    stage: stage.to_string(),
                    error,
                    state,
                    report,
                })
            }
        }
    }

    async fn execute(
        &self,
        monitor: &StageMonitor,
        state: &mut IngestionState,
        report: &mut IngestionReport,
    ) -> Result<(), StageError> {
        let (source, source_type) = (state.source().to_string(), state.source_type().to_string());

        let timer = monitor.started(LOAD).await;
        let text = self.loader.load(&source, &source_type).await.map_err(at(LOAD))?;
        let bytes = text.len();
        state.set_text(text).map_err(at(LOAD))?;
        monitor.completed(timer, json!({ "bytes": bytes })).await;

        let timer = monitor.started(CHUNK).await;
        let contexts = self
            .chunker
            .chunk(state.text().unwrap_or_default(), &source, &source_type);
        report.contexts = contexts.len();
        state.set_contexts(contexts.clone()).map_err(at(CHUNK))?;
        monitor.completed(timer, json!({ "contexts": contexts.len() })).await;

        self.persist(monitor, STORE_RAW, &self.tiers.raw, &contexts).await?;

        let enriched = self.enrich(monitor, &contexts, report).await;
        state.set_enriched_contexts(enriched.clone()).map_err(at(ENRICH))?;
        self.persist(monitor, STORE_ENRICHED, &self.tiers.enriched, &enriched).await?;

        let timer = monitor.started(COMBINE).await;
        let (longterm, unpaired) = combine(&contexts, &enriched, self.config.pairing);
        report.longterm = longterm.len();
        report.unpaired = unpaired;
        state.set_longterm_contexts(longterm.clone()).map_err(at(COMBINE))?;
        monitor
            .completed(timer, json!({ "longterm": longterm.len(), "unpaired": unpaired }))
            .await;
        self.persist(monitor, STORE_LONGTERM, &self.tiers.longterm, &longterm).await?;

        let records = self.extract(monitor, &contexts, report).await;
        state.set_jargon_records(records.clone()).map_err(at(EXTRACT))?;

        let timer = monitor.started(STORE_JARGONS).await;
        self.jargon_store.add(&records).await.map_err(at(STORE_JARGONS))?;
        monitor.completed(timer, json!({ "records": records.len() })).await;

        Ok(())
    }

    async fn persist(
        &self,
        monitor: &StageMonitor,
        stage: &'static str,
        store: &SharedContextStore,
        contexts: &[Context],
    ) -> Result<(), StageError> {
        let timer = monitor.started(stage).await;
        store.add(contexts).await.map_err(at(stage))?;
        monitor
            .completed(timer, json!({ "store": store.name(), "contexts": contexts.len() }))
            .await;
        Ok(())
    }

    async fn enrich(&self, monitor: &StageMonitor, contexts: &[Context], report: &mut IngestionReport) -> Vec<Context> {
        let timer = monitor.started(ENRICH).await;
        let outcome = run_batch(ENRICH, contexts, self.config.concurrency, |context| async move {
            let summary = self
                .summarizer
                .call(SummaryRequest {
                    context: context.text.clone(),
                })
                .await?;
            Ok::<_, RagflowError>(context.with_text(summary.summary))
        })
        .await;

        for failure in &outcome.failures {
            monitor.item_failed(failure).await;
        }
        let failed = outcome.failures.len();
        report.enrich_failures.extend(outcome.failures.iter().cloned());

        let enriched = outcome.into_values();
        report.enriched = enriched.len();
        monitor
            .completed(timer, json!({ "succeeded": enriched.len(), "failed": failed }))
            .await;
        enriched
    }

    async fn extract(
        &self,
        monitor: &StageMonitor,
        contexts: &[Context],
        report: &mut IngestionReport,
    ) -> Vec<JargonRecord> {
        let timer = monitor.started(EXTRACT).await;
        let outcome = run_batch(EXTRACT, contexts, self.config.concurrency, |context| async move {
            let extracted = self
                .extractor
                .call(ExtractionRequest {
                    context: context.text.clone(),
                })
                .await?;
            Ok::<_, RagflowError>(extracted.map(|e| e.jargons).unwrap_or_default())
        })
        .await;

        for failure in &outcome.failures {
            monitor.item_failed(failure).await;
        }
        report.extract_failures.extend(outcome.failures.iter().cloned());

        let mut records = Vec::new();
        for (index, jargons) in outcome.succeeded {
            let context = &contexts[index];
            for jargon in jargons {
                if is_valid_evidence(&jargon.evidence, &context.text, self.config.require_literal_evidence) {
                    records.push(JargonRecord::new(
                        jargon.jargon,
                        jargon.evidence,
                        jargon.explanation,
                        context.metadata.clone(),
                    ));
                } else {
                    report.discarded_jargons += 1;
                }
            }
        }

        report.jargon_records = records.len();
        monitor
            .completed(
                timer,
                json!({
                    "records": records.len(),
                    "discarded": report.discarded_jargons,
                    "failed": report.extract_failures.len(),
                }),
            )
            .await;
        records
    }
}

/// Builds long-term contexts from raw contexts and their summaries.
///
/// Returns the combined contexts and the number of raw contexts without a
/// matching summary.
pub fn combine(raw: &[Context], enriched: &[Context], mode: PairingMode) -> (Vec<Context>, usize) {
    let merge = |original: &Context, summary: &Context| {
        original.with_text(format!("{}\n\n{}", summary.text, original.text))
    };

    match mode {
        PairingMode::ById => {
            let by_id: HashMap<&str, &Context> = enriched.iter().map(|c| (c.id.as_str(), c)).collect();
            let mut combined = Vec::with_capacity(raw.len());
            let mut unpaired = 0;
            for original in raw {
                match by_id.get(original.id.as_str()) {
                    Some(summary) => combined.push(merge(original, summary)),
                    None => unpaired += 1,
                }
            }
            (combined, unpaired)
        }
        PairingMode::Positional => {
            let combined: Vec<Context> = raw
                .iter()
                .zip(enriched)
                .filter(|(original, summary)| original.id == summary.id)
                .map(|(original, summary)| merge(original, summary))
                .collect();
            let unpaired = raw.len() - combined.len();
            (combined, unpaired)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Metadata;
    use pretty_assertions::assert_eq;

    fn ctx(id: &str, text: &str) -> Context {
        Context::new(id, text, Metadata::new()).with_metadata_entry("section", json!("Intro"))
    }

    #[test]
    fn test_combine_by_id_survives_dropped_items() {
        let raw = vec![ctx("a", "A"), ctx("b", "B"), ctx("c", "C")];
        let enriched = vec![ctx("a", "sa"), ctx("c", "sc")];

        let (combined, unpaired) = combine(&raw, &enriched, PairingMode::ById);

        assert_eq!(unpaired, 1);
        assert_eq!(combined.len(), 2);
        assert_eq!(combined[1].id, "c");
        assert_eq!(combined[1].text, "sc\n\nC");
        assert_eq!(combined[1].metadata_str("section"), Some("Intro"));
    }

    #[test]
    fn test_combine_positional_counts_misaligned_pairs() {
        let raw = vec![ctx("a", "A"), ctx("b", "B"), ctx("c", "C")];
        let enriched = vec![ctx("a", "sa"), ctx("c", "sc")];

        let (combined, unpaired) = combine(&raw, &enriched, PairingMode::Positional);

        assert_eq!(combined.len(), 1);
        assert_eq!(combined[0].text, "sa\n\nA");
        assert_eq!(unpaired, 2);
    }

    #[test]
    fn test_combine_aligned() {
        let raw = vec![ctx("a", "A"), ctx("b", "B")];
        let enriched = vec![ctx("a", "sa"), ctx("b", "sb")];

        for mode in [PairingMode::ById, PairingMode::Positional] {
            let (combined, unpaired) = combine(&raw, &enriched, mode);
            assert_eq!(combined.len(), 2);
            assert_eq!(unpaired, 0);
        }
    }

    #[test]
    fn test_evidence_validation() {
        let text = "An LLM, or large language model, predicts tokens.";

        assert!(is_valid_evidence("LLM, or large language model", text, true));
        assert!(!is_valid_evidence("none", text, true));
        assert!(!is_valid_evidence(" None ", text, false));
        assert!(!is_valid_evidence("", text, false));
        assert!(!is_valid_evidence("a made up quote", text, true));
        assert!(is_valid_evidence("a made up quote", text, false));
    }
}

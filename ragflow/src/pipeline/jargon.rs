//! Query-time jargon handling: detect, look up, rewrite.

use crate::agents::{
    AgentPolicy, DetectionRequest, DetectorAgent, EditRequest, EditedMessage, EditorAgent,
    GuardedAgent, PotentialJargons,
};
use crate::config::{AgentCallConfig, JargonConfig};
use crate::core::JargonRecord;
use crate::errors::Result;
use crate::state::QueryState;
use crate::stores::JargonStore;
use tracing::debug;

/// Renders records as a numbered knowledge block, entries separated by a blank line.
#[must_use]
pub fn render_knowledge(records: &[JargonRecord]) -> String {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| record.render(i + 1))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Detects jargon in the working message, looks every confident term up in
/// the jargon store, and asks the editor to clarify the message.
///
/// Writes `potential_jargons`, `jargon_contexts`, `jargon_knowledge` and
/// `edited_message`. When nothing is detected the message is left as is and
/// `jargon_contexts` is empty.
#[derive(Debug)]
pub struct JargonSubflow {
    store: JargonStore,
    detector: GuardedAgent<DetectionRequest, Option<PotentialJargons>>,
    editor: GuardedAgent<EditRequest, EditedMessage>,
    config: JargonConfig,
}

impl JargonSubflow {
    /// Creates the subflow. The detector fails fast; the editor falls back
    /// to leaving the message unchanged.
    #[must_use]
    pub fn new(store: JargonStore, detector: DetectorAgent, editor: EditorAgent) -> Self {
        Self {
            store,
            detector: GuardedAgent::new(detector),
            editor: GuardedAgent::new(editor).with_fallback(EditedMessage::fallback()),
            config: JargonConfig::default(),
        }
    }

    /// Sets the threshold and lookup limit.
    #[must_use]
    pub fn with_config(mut self, config: JargonConfig) -> Self {
        self.config = config;
        self
    }

    /// Applies timeout and retry settings to both agents.
    #[must_use]
    pub fn with_call_config(mut self, config: &AgentCallConfig) -> Self {
        self.detector = self.detector.with_call_config(config);
        self.editor = self.editor.with_call_config(config);
        self
    }

    /// Sets the editor failure policy.
    #[must_use]
    pub fn with_editor_policy(mut self, policy: AgentPolicy<EditedMessage>) -> Self {
        self.editor = self.editor.with_policy(policy);
        self
    }

    /// Runs the subflow against `state`.
    ///
    /// # Errors
    ///
    /// Returns the detector or editor error under `FailFast`, a jargon store
    /// error, or a state conflict if the subflow already ran on `state`.
    pub async fn run(&self, state: &mut QueryState) -> Result<()> {
        let detected = self
            .detector
            .call(DetectionRequest {
                message: state.message().to_string(),
            })
            .await?
            .unwrap_or_default();

        let terms = detected.above(self.config.confidence_threshold);
        debug!(
            detected = detected.jargons.len(),
            kept = terms.len(),
            threshold = self.config.confidence_threshold,
            "Filtered jargon candidates"
        );
        state.set_potential_jargons(terms.clone())?;

        if terms.is_empty() {
            state.set_jargon_contexts(Vec::new())?;
            return Ok(());
        }

        let mut records = Vec::new();
        for term in &terms {
            let hits = self.store.search(term, self.config.search_limit).await?;
            debug!(term = %term, hits = hits.len(), "Looked up jargon");
            records.extend(hits.into_iter().map(|hit| hit.record));
        }

        let knowledge = render_knowledge(&records);
        state.set_jargon_contexts(records)?;
        state.set_jargon_knowledge(knowledge.clone())?;

        let edited = self
            .editor
            .call(EditRequest {
                knowledge,
                message: state.message().to_string(),
            })
            .await?;
        state.set_edited_message(edited.edited_message)?;
        Ok(())
    }
}

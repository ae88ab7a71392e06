use super::failure::ItemFailure;
use crate::errors::RagflowError;
use crate::events::{
    SharedEventSink, ITEM_FAILED, STAGE_COMPLETED, STAGE_FAILED, STAGE_SKIPPED, STAGE_STARTED,
};
use crate::observability::SpanTimer;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Logs stage progress and forwards it to the event sink for one run.
#[derive(Debug, Clone)]
pub(crate) struct StageMonitor {
    sink: SharedEventSink,
    pipeline: &'static str,
    run_id: String,
}

impl StageMonitor {
    pub(crate) fn new(sink: SharedEventSink, pipeline: &'static str) -> Self {
        Self {
            sink,
            pipeline,
            run_id: uuid::Uuid::now_v7().to_string(),
        }
    }

    pub(crate) fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Emits `event_type` with `data` merged into the run fields.
    pub(crate) async fn emit(&self, event_type: &str, data: Value) {
        let mut payload = json!({
            "pipeline": self.pipeline,
            "run_id": self.run_id,
        });
        if let (Some(target), Value::Object(extra)) = (payload.as_object_mut(), data) {
            target.extend(extra);
        }
        self.sink.emit(event_type, payload).await;
    }

    pub(crate) async fn started(&self, stage: &str) -> SpanTimer {
        debug!(pipeline = self.pipeline, run_id = %self.run_id, stage, "Stage started");
        self.emit(STAGE_STARTED, json!({ "stage": stage })).await;
        SpanTimer::start(stage)
    }

    pub(crate) async fn completed(&self, timer: SpanTimer, data: Value) {
        let stage = timer.name().to_string();
        let duration_ms = timer.finish();
        info!(pipeline = self.pipeline, run_id = %self.run_id, stage, duration_ms, details = %data, "Stage completed");

        let mut payload = json!({ "stage": stage, "duration_ms": duration_ms });
        if let (Some(target), Value::Object(extra)) = (payload.as_object_mut(), data) {
            target.extend(extra);
        }
        self.emit(STAGE_COMPLETED, payload).await;
    }

    pub(crate) async fn skipped(&self, stage: &str, reason: &str) {
        debug!(pipeline = self.pipeline, run_id = %self.run_id, stage, reason, "Stage skipped");
        self.emit(STAGE_SKIPPED, json!({ "stage": stage, "reason": reason })).await;
    }

    pub(crate) async fn failed(&self, stage: &str, error: &RagflowError) {
        warn!(pipeline = self.pipeline, run_id = %self.run_id, stage, error = %error, "Stage failed");
        self.emit(
            STAGE_FAILED,
            json!({
                "stage": stage,
                "error": error.to_string(),
                "kind": error.kind(),
            }),
        )
        .await;
    }

    pub(crate) async fn item_failed(&self, failure: &ItemFailure) {
        self.emit(
            ITEM_FAILED,
            json!({
                "stage": failure.stage,
                "index": failure.index,
                "context_id": failure.context_id,
                "error": failure.error,
                "kind": failure.kind,
            }),
        )
        .await;
    }
}

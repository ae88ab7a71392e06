//! Pipeline events.
//!
//! The pipelines report progress to an injected [`EventSink`]. Event names
//! are the constants below; the payload is a JSON object with at least the
//! run id and, for stage events, the stage name.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, SharedEventSink};

/// An ingestion run began.
pub const INGESTION_STARTED: &str = "ingestion.started";
/// An ingestion run finished without a fatal error.
pub const INGESTION_COMPLETED: &str = "ingestion.completed";
/// A query run began.
pub const QUERY_STARTED: &str = "query.started";
/// A query run produced its answer.
pub const QUERY_COMPLETED: &str = "query.completed";
/// A stage began.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage finished.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage did not run because its collaborator or input is missing.
pub const STAGE_SKIPPED: &str = "stage.skipped";
/// A stage failed. Fatal for ingestion, recorded and skipped for query.
pub const STAGE_FAILED: &str = "stage.failed";
/// One item of a batch failed and was left out.
pub const ITEM_FAILED: &str = "item.failed";

//! Core data types shared by every pipeline.
//!
//! This module provides:
//! - `Context`, the unit of retrievable text carried through the tiers
//! - `JargonRecord`, one extracted term with its evidence and explanation

mod context;
mod jargon;

pub use context::{dedup_by_id, join_texts, Context, Metadata, CONTEXT_SEPARATOR};
pub use jargon::JargonRecord;

//! Request-scoped pipeline state.
//!
//! Each field is a write-once [`Slot`] owned by exactly one stage. Later
//! stages only read it; a second write is a [`StateConflictError`].
//!
//! [`StateConflictError`]: crate::errors::StateConflictError

mod ingestion;
mod query;
mod slot;

pub use ingestion::IngestionState;
pub use query::QueryState;
pub use slot::Slot;

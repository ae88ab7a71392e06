//! Error types for the ragflow pipelines.
//!
//! The taxonomy follows the three failure classes the pipelines distinguish:
//! fatal stage errors abort a run, item errors are isolated per chunk, and
//! agent errors are resolved by the agent's configured policy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RagflowError>;

/// The main error type for ragflow operations.
#[derive(Debug, Error)]
pub enum RagflowError {
    /// An agent call failed and its policy did not supply a fallback.
    #[error("{0}")]
    Agent(#[from] AgentError),

    /// A context store, jargon store, reranker or embedding call failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// The source document could not be loaded.
    #[error("Load error for '{source_path}': {message}")]
    Load {
        /// The source that failed to load.
        source_path: String,
        /// The reason.
        message: String,
    },

    /// A state field was written twice.
    #[error("{0}")]
    StateConflict(#[from] StateConflictError),

    /// Invalid configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagflowError {
    /// Creates a load error.
    #[must_use]
    pub fn load(source_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            source_path: source_path.into(),
            message: message.into(),
        }
    }

    /// Creates a config error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Short machine-readable name of the error class.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Agent(AgentError::Timeout { .. }) => "agent_timeout",
            Self::Agent(_) => "agent",
            Self::Store(_) => "store",
            Self::Load { .. } => "load",
            Self::StateConflict(_) => "state_conflict",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
            Self::Io(_) => "io",
        }
    }
}

impl From<serde_json::Error> for RagflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised by agent calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    /// The agent ran but reported a failure.
    #[error("Agent '{agent}' failed: {reason}")]
    Failed {
        /// The agent name.
        agent: String,
        /// The reason for failure.
        reason: String,
    },

    /// The agent did not answer within its deadline.
    #[error("Agent '{agent}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The agent name.
        agent: String,
        /// The deadline that expired.
        timeout_ms: u64,
    },

    /// The agent answered with something that is not a well-formed response.
    #[error("Agent '{agent}' returned a malformed response: {reason}")]
    Malformed {
        /// The agent name.
        agent: String,
        /// What was wrong with the response.
        reason: String,
    },
}

impl AgentError {
    /// Creates a failed error.
    #[must_use]
    pub fn failed(agent: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            agent: agent.into(),
            reason: reason.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(agent: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            agent: agent.into(),
            timeout_ms,
        }
    }

    /// Creates a malformed-response error.
    #[must_use]
    pub fn malformed(agent: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            agent: agent.into(),
            reason: reason.into(),
        }
    }

    /// Returns the agent name.
    #[must_use]
    pub fn agent(&self) -> &str {
        match self {
            Self::Failed { agent, .. } | Self::Timeout { agent, .. } | Self::Malformed { agent, .. } => agent,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();

        match self {
            Self::Failed { agent, reason } => {
                map.insert("type".to_string(), serde_json::json!("AgentFailed"));
                map.insert("agent".to_string(), serde_json::json!(agent));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::Timeout { agent, timeout_ms } => {
                map.insert("type".to_string(), serde_json::json!("AgentTimeout"));
                map.insert("agent".to_string(), serde_json::json!(agent));
                map.insert("timeout_ms".to_string(), serde_json::json!(timeout_ms));
            }
            Self::Malformed { agent, reason } => {
                map.insert("type".to_string(), serde_json::json!("AgentMalformed"));
                map.insert("agent".to_string(), serde_json::json!(agent));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Errors raised by stores and the other retrieval collaborators.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing database reported an error.
    #[error("Database error in '{store}': {message}")]
    Database {
        /// The store name (table or tier).
        store: String,
        /// The database message.
        message: String,
    },

    /// The store does not support the requested operation.
    #[error("Unsupported operation on '{store}': {message}")]
    Unsupported {
        /// The store name.
        store: String,
        /// What was requested.
        message: String,
    },

    /// An identifier (table name, column) is not acceptable.
    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    /// A collaborator (embedding model, reranker) failed.
    #[error("Collaborator '{name}' failed: {message}")]
    Collaborator {
        /// The collaborator name.
        name: String,
        /// The reason.
        message: String,
    },
}

impl StoreError {
    /// Creates a database error.
    #[must_use]
    pub fn database(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Creates an unsupported-operation error.
    #[must_use]
    pub fn unsupported(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unsupported {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Creates a collaborator error.
    #[must_use]
    pub fn collaborator(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Error raised when a write-once state field is written a second time.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("State conflict: field '{field}' was already written")]
pub struct StateConflictError {
    /// The conflicting field.
    pub field: String,
}

impl StateConflictError {
    /// Creates a new state conflict error.
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_to_dict() {
        let err = AgentError::timeout("detector", 1500);
        let dict = err.to_dict();

        assert_eq!(dict.get("type").unwrap(), "AgentTimeout");
        assert_eq!(dict.get("agent").unwrap(), "detector");
        assert_eq!(dict.get("timeout_ms").unwrap(), 1500);
    }

    #[test]
    fn test_agent_error_name() {
        assert_eq!(AgentError::failed("editor", "boom").agent(), "editor");
        assert_eq!(AgentError::malformed("oracle", "bad json").agent(), "oracle");
    }

    #[test]
    fn test_error_kind() {
        let err: RagflowError = AgentError::timeout("a", 1).into();
        assert_eq!(err.kind(), "agent_timeout");

        let err: RagflowError = StoreError::database("jargons", "locked").into();
        assert_eq!(err.kind(), "store");
        assert!(err.to_string().contains("jargons"));
    }

    #[test]
    fn test_state_conflict_display() {
        let err = StateConflictError::new("answer");
        assert_eq!(err.to_string(), "State conflict: field 'answer' was already written");
    }

    #[test]
    fn test_load_error() {
        let err = RagflowError::load("missing.md", "not found");
        assert!(err.to_string().contains("missing.md"));
        assert_eq!(err.kind(), "load");
    }
}

//! Agent-crate error type: storage, sync, and config failures that sit
//! above `bazaar_core::BazaarError` in the stack.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("store error: {0}")]
    Store(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("conflict on {entity_type} {entity_id}")]
    Conflict { entity_type: String, entity_id: String },

    #[error(transparent)]
    Core(#[from] bazaar_core::BazaarError),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

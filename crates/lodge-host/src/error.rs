use lodge_core::LifecycleState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("no target resolves {descriptor} (id {id})")]
    TargetNotFound { id: String, descriptor: String },

    #[error("cannot {operation} while the host is {state}")]
    IllegalHostState {
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("malformed persisted entry for {id}: {reason}")]
    MalformedPersistedEntry { id: String, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

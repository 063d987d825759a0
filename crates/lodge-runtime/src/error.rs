use thiserror::Error;

use crate::platform::{InvokeFault, ValueKind};

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("no such entry point: {entry}")]
    NoSuchEntryPoint { entry: String },

    #[error("{entry} rejected the call: {reason}")]
    InvocationRejected { entry: String, reason: String },

    #[error("incompatible argument shape for {entry}: {detail}")]
    IncompatibleArgumentShape { entry: String, detail: String },
}

impl AdapterError {
    pub(crate) fn from_fault(entry: &str, fault: InvokeFault) -> Self {
        match fault {
            InvokeFault::Rejected(reason) => AdapterError::InvocationRejected {
                entry: entry.to_string(),
                reason,
            },
            InvokeFault::BadArguments(detail) => AdapterError::IncompatibleArgumentShape {
                entry: entry.to_string(),
                detail,
            },
        }
    }

    pub(crate) fn unexpected_return(entry: &str, expected: ValueKind, got: ValueKind) -> Self {
        AdapterError::IncompatibleArgumentShape {
            entry: entry.to_string(),
            detail: format!("expected {expected:?} return, got {got:?}"),
        }
    }

    /// Entry point name the failure is about.
    pub fn entry(&self) -> &str {
        match self {
            AdapterError::NoSuchEntryPoint { entry }
            | AdapterError::InvocationRejected { entry, .. }
            | AdapterError::IncompatibleArgumentShape { entry, .. } => entry,
        }
    }
}

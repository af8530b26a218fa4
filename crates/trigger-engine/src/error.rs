//! Engine error types

use shared::TriggerKind;
use thiserror::Error;

use crate::dispatch::TriggerId;
use crate::selector::SelectorError;
use crate::storage::StorageError;

/// Errors raised while building or running a trigger engine
///
/// Only [`EngineError::NoRuntime`] escapes [`TriggerEngine::start`](crate::TriggerEngine::start);
/// the others describe why a single detector did not activate and are logged.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Trigger engine must be started inside a tokio runtime")]
    NoRuntime,

    #[error("Invalid {kind} trigger {trigger_id}: {message}")]
    InvalidSpec {
        trigger_id: TriggerId,
        kind: TriggerKind,
        message: String,
    },

    #[error("Invalid selector '{selector}': {source}")]
    Selector {
        selector: String,
        #[source]
        source: SelectorError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Create an invalid spec error
    pub fn invalid_spec(trigger_id: TriggerId, kind: TriggerKind, message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            trigger_id,
            kind,
            message: message.into(),
        }
    }
}

//! Error types for loop, stream and dispatch operations.

use thiserror::Error;

use crate::context::StreamKey;

/// Errors surfaced by the runtime bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Stream '{stream}' is already scheduled")]
    AlreadyScheduled { stream: StreamKey },

    #[error("Stream '{stream}' is not scheduled")]
    NotScheduled { stream: StreamKey },

    #[error("Failed to create event stream '{stream}': {reason}")]
    WatchCreateFailed { stream: StreamKey, reason: String },

    #[error("Failed to start event stream '{stream}': {reason}")]
    WatchStartFailed { stream: StreamKey, reason: String },

    /// The callback could not be run to completion and left no error of its own.
    #[error("Unable to call callback function for stream '{stream}'")]
    CallbackInvocationFailed { stream: StreamKey },

    #[error("Callback for stream '{stream}' failed: {source}")]
    CallbackFailed {
        stream: StreamKey,
        #[source]
        source: anyhow::Error,
    },

    #[error("Malformed arguments to {function}(): {reason}")]
    MalformedArguments { function: String, reason: String },

    #[error("Failed to load settings: {reason}")]
    Config { reason: String },
}

impl BridgeError {
    pub(crate) fn malformed(function: &str, reason: impl Into<String>) -> Self {
        BridgeError::MalformedArguments {
            function: function.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error was produced by a failing callback during dispatch.
    pub fn is_callback_failure(&self) -> bool {
        matches!(
            self,
            BridgeError::CallbackFailed { .. } | BridgeError::CallbackInvocationFailed { .. }
        )
    }
}

impl From<figment::Error> for BridgeError {
    fn from(e: figment::Error) -> Self {
        BridgeError::Config {
            reason: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

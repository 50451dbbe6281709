//! Error types for the listener registry

/// Failure reported by a listener callback.
///
/// Registry operations never fail; the only fault a caller can observe is a
/// listener's own callback returning one of these from
/// [`EventFamily::handle`](crate::EventFamily::handle).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    /// Handler execution failed
    #[error("Handler execution failed: {0}")]
    HandlerFailed(String),

    /// The listener refused the event
    #[error("Listener rejected event: {reason}")]
    Rejected { reason: String },
}

impl ListenerError {
    /// Handler failure with a free-form message
    pub fn failed(message: impl Into<String>) -> Self {
        Self::HandlerFailed(message.into())
    }

    /// Refusal of an event the listener does not accept
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// Invalid registry configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid registry configuration: {0}")]
    Invalid(String),
}

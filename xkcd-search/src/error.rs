//! Error types for the update and search services

use crate::events::Topic;

/// Result type for core update and search operations.
///
/// This is a convenience type alias that uses [`Error`] as the error type.
/// Adapters (store, feed, bus) report failures with [`anyhow::Error`]; those
/// surface here as [`Error::Upstream`].
pub type Result<T> = std::result::Result<T, Error>;

/// Every way a core operation can fail.
///
/// No variant is process-fatal: each failure is scoped to the invocation that
/// produced it, and callers decide whether to retry.
///
/// # Error Categories
///
/// - **NotFound**: an absent comic, or a search with no matching comics
/// - **AlreadyRunning**: an update pass was requested while another is active
/// - **InvalidInput**: a malformed phrase, limit or configuration value
/// - **Upstream**: the source feed, corpus store or normalizer failed
/// - **Notification**: the corpus mutation succeeded but publishing the
///   change event did not
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Nothing matched the request
    #[error("not found")]
    NotFound,

    /// Single-flight conflict on update
    #[error("update already runs")]
    AlreadyRunning,

    /// Caller supplied something unusable
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Failure of a collaborator: source feed, corpus store, normalizer
    #[error("upstream failure: {source:#}")]
    Upstream {
        #[from]
        source: anyhow::Error,
    },

    /// The mutation is durable, only the change event was lost
    #[error("corpus changed but the {topic} notification failed: {source:#}")]
    Notification {
        topic: Topic,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    /// Create an invalid input error with a custom message.
    ///
    /// # Arguments
    /// * `message` - What is wrong with the input
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Whether the corpus mutation itself went through.
    ///
    /// True only for [`Error::Notification`]: the caller may retry the
    /// notification without redoing the mutation.
    pub fn mutation_succeeded(&self) -> bool {
        matches!(self, Self::Notification { .. })
    }
}

//! Network-layer error types.

/// Errors that can occur while talking to the broker or the manager.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// A payload could not be encoded or decoded as JSON.
    #[error("JSON codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// NATS connection error.
    #[error("NATS connection error: {0}")]
    Connect(#[from] async_nats::ConnectError),

    /// A JetStream stream, consumer, or publish operation failed.
    #[error("JetStream error: {0}")]
    JetStream(String),

    /// A delivery could not be acknowledged or requeued.
    #[error("failed to resolve delivery: {0}")]
    Ack(String),

    /// HTTP transport error talking to the manager.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The manager answered with a non-success status.
    #[error("manager returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
}

impl NetError {
    pub(crate) fn jetstream(err: impl std::fmt::Display) -> Self {
        Self::JetStream(err.to_string())
    }

    pub(crate) fn ack(err: impl std::fmt::Display) -> Self {
        Self::Ack(err.to_string())
    }
}

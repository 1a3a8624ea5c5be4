//! Error types for network operations.

use std::time::Duration;

use ringleader_types::RpcError;

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Failed to connect to a remote endpoint.
    #[error("connection error: {0}")]
    Connect(String),

    /// Connecting did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Socket read or write failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A frame exceeded [`crate::MAX_MESSAGE_SIZE`].
    #[error("message too large: {0} bytes")]
    MessageTooLarge(usize),

    /// The peer closed the connection before a full frame arrived.
    #[error("stream closed")]
    StreamClosed,

    /// The remote handled the request and returned a structured error.
    #[error("remote error: {0}")]
    Remote(RpcError),

    /// The remote answered with a message of the wrong kind.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

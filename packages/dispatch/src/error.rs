//! Error types for the dispatch core.

use thiserror::Error;

/// Errors that can occur while decoding, routing, performing, or
/// scheduling messages.
#[derive(Debug, Error)]
pub enum Error {
    /// An inbound string was not a valid message envelope.
    #[error("not a valid message: {0}")]
    Decoding(#[source] serde_json::Error),

    /// No handler resolves for the receiver/selector pair.
    #[error("{receiver:?} does not understand {selector:?}")]
    NoSuchMethod {
        /// Receiver named by the message, possibly empty.
        receiver: String,
        /// Selector named by the message.
        selector: String,
    },

    /// A handler failed to perform a message.
    #[error("perform failed: {0}")]
    Perform(String),

    /// A value could not be serialized onto the wire.
    #[error("not encodable: {0}")]
    Encoding(#[source] serde_json::Error),

    /// A scheduling delay was negative.
    #[error("cannot schedule a call in the past ({0} ms)")]
    InvalidDelay(i64),

    /// The underlying channel primitive failed.
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
}

impl Error {
    /// Routing miss for the given receiver/selector pair.
    pub fn no_such_method(receiver: impl Into<String>, selector: impl Into<String>) -> Self {
        Error::NoSuchMethod {
            receiver: receiver.into(),
            selector: selector.into(),
        }
    }

    /// Handler failure carrying its own description.
    pub fn perform(message: impl Into<String>) -> Self {
        Error::Perform(message.into())
    }
}

/// Failure of a raw channel primitive.
///
/// Kept separate from [`Error`] so transport implementations do not need
/// the full dispatch taxonomy.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    /// Description of the channel failure.
    pub message: String,
}

impl TransportError {
    /// Create a transport error from any printable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, Error>;

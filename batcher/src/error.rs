//! Error types for the message batcher.
//!
//! This module defines [`Error`], the error type for all batcher operations,
//! along with a convenient [`Result`] type alias.

/// Error type for message batcher operations.
///
/// Crossing a count, size or time threshold is never an error: thresholds
/// trigger flushes. Delivery failures belong to the
/// [`BatchSender`](crate::BatchSender) implementation and never surface here.
///
/// # Error Categories
///
/// - [`EmptyPayload`](Error::EmptyPayload): a zero-length message was
///   rejected by [`MessageBatcher::add_message`](crate::MessageBatcher::add_message).
/// - [`InvalidConfiguration`](Error::InvalidConfiguration): a threshold was
///   zero when constructing the batcher.
/// - [`InvalidInput`](Error::InvalidInput): a malformed value was provided by
///   the caller, such as a sequence number containing non-digits.
/// - [`Closed`](Error::Closed): a message was added after the batcher was
///   closed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A zero-length payload was passed to `add_message`.
    ///
    /// The batcher state is left untouched. Callers should treat this as a
    /// rejected input rather than a transient condition.
    #[error("Empty messages can't be sent")]
    EmptyPayload,

    /// A configuration value was out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Invalid input or parameter errors.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The batcher has been closed and no longer accepts messages.
    #[error("Batcher is closed")]
    Closed,
}

/// Result type alias for message batcher operations.
///
/// This is a convenience alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

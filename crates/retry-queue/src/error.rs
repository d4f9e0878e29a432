//! Queue error types and the retryable error trait.

use thiserror::Error;

/// Classifies failures for retry handling.
///
/// Implemented by the error type of operations submitted to the queue.
/// Rate-limited failures pause the queue and re-run the same operation
/// without consuming a retry attempt; all other failures consume one.
pub trait RetryableError: Send {
    /// Whether this failure was caused by backend rate limiting.
    fn is_rate_limited(&self) -> bool;
}

/// Error returned to callers awaiting a queued operation.
#[derive(Error, Debug)]
pub enum QueueError<E> {
    /// The operation failed and its retries are exhausted
    #[error("{0}")]
    Operation(E),

    /// The queue was cleared before the operation completed
    #[error("Operation cancelled (queue cleared)")]
    Cancelled,

    /// The queue worker is no longer running
    #[error("Retry queue is shut down")]
    Closed,
}

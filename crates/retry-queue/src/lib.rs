//! # RetryQueue: serialized backend calls with retry and backoff
//!
//! Auth endpoints rate-limit aggressively, so calls that hit them are
//! funneled through a single FIFO queue instead of firing concurrently.
//! One background worker executes operations strictly in arrival order
//! and owns all retry handling.
//!
//! ## Behavior
//!
//! - **FIFO**: one operation in flight at a time; later arrivals wait.
//! - **Exponential backoff**: ordinary failures retry after
//!   `initial_delay * backoff_factor^n`, capped at `max_delay`, until
//!   `max_retries` is exhausted.
//! - **Rate-limit pause**: a rate-limited failure pauses the whole queue
//!   for `initial_delay`, keeps the operation at the head, and restores
//!   its retry budget.
//! - **Pacing**: consecutive operations are spaced by `pacing_gap`.
//!
//! ## Example
//!
//! ```ignore
//! use retry_queue::{RetryQueue, RetryQueueConfig};
//! use futures_util::FutureExt;
//!
//! let queue = RetryQueue::new(RetryQueueConfig::default());
//! queue.start();
//!
//! let session = queue
//!     .enqueue("sign_in", move || {
//!         let gateway = gateway.clone();
//!         async move { gateway.sign_in(&email, &password).await }.boxed()
//!     })
//!     .await?;
//! ```

mod error;
mod queue;

pub use error::{QueueError, RetryableError};
pub use queue::{RetryQueue, RetryQueueConfig};

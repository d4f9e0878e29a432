//! FIFO retry queue with a single background worker.

use crate::{QueueError, RetryableError};
use futures_util::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Duration;
use tracing::{debug, warn};

/// Default capacity of the command channel.
const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Factory that produces a fresh future for each execution attempt.
type OperationFactory<T, E> = Box<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Configuration for retry and pacing behavior.
///
/// # Backoff Calculation
///
/// Retry delay follows exponential backoff: `initial_delay * backoff_factor^n`
/// (where `n` is the number of retries already used) capped at `max_delay`.
/// For the default config:
/// - 1st retry: after 5s
/// - 2nd retry: after 10s
///
/// A rate-limited failure instead waits `initial_delay` and re-runs the same
/// operation with its retry budget restored.
#[derive(Debug, Clone)]
pub struct RetryQueueConfig {
    /// Maximum number of retries after the first execution.
    pub max_retries: u32,
    /// Delay before the first retry, and the pause after a rate-limit hit.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth).
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failed retry.
    pub backoff_factor: u32,
    /// Pause between consecutive queue items, so bursts of queued calls
    /// do not hammer the backend.
    pub pacing_gap: Duration,
}

impl Default for RetryQueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(15),
            backoff_factor: 2,
            pacing_gap: Duration::from_secs(1),
        }
    }
}

impl RetryQueueConfig {
    /// Delay before the next retry, given how many retries were already used.
    pub fn delay_for_attempt(&self, attempts_used: u32) -> Duration {
        let initial_ms = self.initial_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let multiplier = (self.backoff_factor as u64).saturating_pow(attempts_used);
        let delay_ms = initial_ms.saturating_mul(multiplier).min(max_ms);
        Duration::from_millis(delay_ms)
    }
}

/// An operation waiting in the queue.
struct QueuedOperation<T, E> {
    /// Caller label for log lines.
    caller: String,
    factory: OperationFactory<T, E>,
    reply: oneshot::Sender<Result<T, QueueError<E>>>,
}

/// Commands accepted by the worker.
enum WorkerCommand<T, E> {
    Enqueue(QueuedOperation<T, E>),
    ClearAll,
}

/// How a single head-of-queue operation run ended.
enum RunOutcome<T, E> {
    /// The operation resolved (success or retries exhausted).
    Resolved(Result<T, QueueError<E>>),
    /// A clear arrived while the operation was at the head.
    Cleared,
}

/// FIFO retry queue.
///
/// Operations are executed strictly one at a time, in arrival order, by a
/// single background worker. Each operation is a factory so that every
/// retry runs a fresh future.
///
/// # Lifecycle
///
/// 1. Create with [`RetryQueue::new()`]
/// 2. Call [`RetryQueue::start()`] to spawn the background worker
/// 3. Submit operations with [`RetryQueue::enqueue()`] and await their results
///
/// # Failure Handling
///
/// - Rate-limited failures pause the queue for `initial_delay`, keep the
///   operation at the head, and restore its retry budget.
/// - Other failures retry with exponential backoff until `max_retries` is
///   exhausted, then reject with [`QueueError::Operation`].
/// - [`RetryQueue::clear_all()`] rejects every pending operation and the
///   in-flight one with [`QueueError::Cancelled`].
pub struct RetryQueue<T, E> {
    config: RetryQueueConfig,
    /// Channel sender for submitting commands to the worker.
    sender: mpsc::Sender<WorkerCommand<T, E>>,
    /// Channel receiver (taken by the worker on start).
    receiver: Mutex<Option<mpsc::Receiver<WorkerCommand<T, E>>>>,
}

impl<T, E> RetryQueue<T, E>
where
    T: Send + 'static,
    E: RetryableError + 'static,
{
    /// Creates a new retry queue. The worker is not running until
    /// [`start()`](Self::start) is called.
    pub fn new(config: RetryQueueConfig) -> Self {
        let (sender, receiver) = mpsc::channel(DEFAULT_QUEUE_CAPACITY);
        Self {
            config,
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Starts the background worker loop.
    ///
    /// # Panics
    ///
    /// Panics if called more than once (the worker can only be started once).
    pub fn start(&self) {
        let receiver = self
            .receiver
            .lock()
            .expect("lock poisoned")
            .take()
            .expect("RetryQueue already started");

        let config = self.config.clone();
        tokio::spawn(run_worker(config, receiver));
    }

    /// Submits an operation and waits for its final outcome.
    ///
    /// The factory is invoked once per execution attempt. `caller` labels
    /// the operation in log lines.
    pub async fn enqueue<F>(&self, caller: impl Into<String>, factory: F) -> Result<T, QueueError<E>>
    where
        F: Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let op = QueuedOperation {
            caller: caller.into(),
            factory: Box::new(factory),
            reply: reply_tx,
        };

        self.sender
            .send(WorkerCommand::Enqueue(op))
            .await
            .map_err(|_| QueueError::Closed)?;

        reply_rx.await.map_err(|_| QueueError::Closed)?
    }

    /// Rejects every pending operation and the in-flight one with
    /// [`QueueError::Cancelled`].
    pub async fn clear_all(&self) {
        if self.sender.send(WorkerCommand::ClearAll).await.is_err() {
            debug!("retry queue clear skipped (worker not running)");
        }
    }
}

/// Worker loop: pops operations in FIFO order and runs each to resolution.
///
/// The command channel stays serviced while an operation executes or a
/// backoff sleep is in progress, so new arrivals queue up behind the head
/// and a clear takes effect immediately.
async fn run_worker<T, E: RetryableError>(
    config: RetryQueueConfig,
    mut receiver: mpsc::Receiver<WorkerCommand<T, E>>,
) {
    let mut backlog: VecDeque<QueuedOperation<T, E>> = VecDeque::new();
    let mut channel_open = true;

    loop {
        let next = match backlog.pop_front() {
            Some(op) => Some(op),
            None if channel_open => match receiver.recv().await {
                Some(WorkerCommand::Enqueue(op)) => Some(op),
                Some(WorkerCommand::ClearAll) => continue,
                None => {
                    channel_open = false;
                    None
                }
            },
            None => None,
        };

        let Some(op) = next else {
            break;
        };

        let QueuedOperation {
            caller,
            factory,
            reply,
        } = op;

        let outcome = run_operation(
            &config,
            &mut receiver,
            &mut backlog,
            &mut channel_open,
            &caller,
            &factory,
        )
        .await;

        match outcome {
            RunOutcome::Resolved(result) => {
                let _ = reply.send(result);
            }
            RunOutcome::Cleared => {
                let _ = reply.send(Err(QueueError::Cancelled));
                reject_all(&mut backlog, || QueueError::Cancelled);
                continue;
            }
        }

        // Pace before the next item
        if !service_channel_for(config.pacing_gap, &mut receiver, &mut backlog, &mut channel_open)
            .await
        {
            reject_all(&mut backlog, || QueueError::Cancelled);
        }
    }

    reject_all(&mut backlog, || QueueError::Closed);
}

/// Runs one operation to resolution, retrying per the config.
async fn run_operation<T, E: RetryableError>(
    config: &RetryQueueConfig,
    receiver: &mut mpsc::Receiver<WorkerCommand<T, E>>,
    backlog: &mut VecDeque<QueuedOperation<T, E>>,
    channel_open: &mut bool,
    caller: &str,
    factory: &OperationFactory<T, E>,
) -> RunOutcome<T, E> {
    let mut attempts_used: u32 = 0;

    loop {
        debug!(caller = %caller, attempts_used, "retry queue executing operation");
        let mut fut = factory();

        // Drive the attempt while keeping the command channel serviced
        let result = loop {
            tokio::select! {
                res = &mut fut => break res,
                cmd = receiver.recv(), if *channel_open => match cmd {
                    Some(WorkerCommand::Enqueue(op)) => backlog.push_back(op),
                    Some(WorkerCommand::ClearAll) => return RunOutcome::Cleared,
                    None => *channel_open = false,
                }
            }
        };

        match result {
            Ok(value) => return RunOutcome::Resolved(Ok(value)),
            Err(err) if err.is_rate_limited() => {
                warn!(
                    caller = %caller,
                    pause_ms = config.initial_delay.as_millis() as u64,
                    "rate limited, pausing queue and restoring retry budget"
                );
                attempts_used = 0;
                if !service_channel_for(config.initial_delay, receiver, backlog, channel_open).await
                {
                    return RunOutcome::Cleared;
                }
            }
            Err(err) => {
                if attempts_used >= config.max_retries {
                    warn!(
                        caller = %caller,
                        attempts_used,
                        "operation failed, retries exhausted"
                    );
                    return RunOutcome::Resolved(Err(QueueError::Operation(err)));
                }

                let delay = config.delay_for_attempt(attempts_used);
                attempts_used += 1;
                warn!(
                    caller = %caller,
                    attempts_used,
                    delay_ms = delay.as_millis() as u64,
                    "operation failed, retrying after backoff"
                );
                if !service_channel_for(delay, receiver, backlog, channel_open).await {
                    return RunOutcome::Cleared;
                }
            }
        }
    }
}

/// Sleeps for `dur` while keeping the command channel serviced.
///
/// Returns `false` if a clear arrived during the sleep.
async fn service_channel_for<T, E>(
    dur: Duration,
    receiver: &mut mpsc::Receiver<WorkerCommand<T, E>>,
    backlog: &mut VecDeque<QueuedOperation<T, E>>,
    channel_open: &mut bool,
) -> bool {
    let sleep = tokio::time::sleep(dur);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = receiver.recv(), if *channel_open => match cmd {
                Some(WorkerCommand::Enqueue(op)) => backlog.push_back(op),
                Some(WorkerCommand::ClearAll) => return false,
                None => *channel_open = false,
            }
        }
    }
}

/// Rejects every backlogged operation with the given error.
fn reject_all<T, E>(
    backlog: &mut VecDeque<QueuedOperation<T, E>>,
    error: impl Fn() -> QueueError<E>,
) {
    for op in backlog.drain(..) {
        let _ = op.reply.send(Err(error()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[derive(Debug)]
    enum TestError {
        RateLimited,
        Other(&'static str),
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::RateLimited => write!(f, "rate limit exceeded"),
                TestError::Other(msg) => write!(f, "{}", msg),
            }
        }
    }

    impl RetryableError for TestError {
        fn is_rate_limited(&self) -> bool {
            matches!(self, TestError::RateLimited)
        }
    }

    fn fast_config() -> RetryQueueConfig {
        RetryQueueConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(30),
            backoff_factor: 2,
            pacing_gap: Duration::from_millis(1),
        }
    }

    fn started_queue(config: RetryQueueConfig) -> Arc<RetryQueue<u32, TestError>> {
        let queue = Arc::new(RetryQueue::new(config));
        queue.start();
        queue
    }

    // ==== backoff math ====

    #[test]
    fn delay_for_attempt_grows_and_caps() {
        let config = RetryQueueConfig {
            max_retries: 5,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(15),
            backoff_factor: 2,
            pacing_gap: Duration::from_secs(1),
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(15));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(15));
    }

    #[test]
    fn delay_for_attempt_large_attempt_saturates() {
        let config = RetryQueueConfig::default();
        assert_eq!(config.delay_for_attempt(u32::MAX), config.max_delay);
    }

    #[test]
    fn default_config_values() {
        let config = RetryQueueConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.initial_delay, Duration::from_secs(5));
        assert_eq!(config.max_delay, Duration::from_secs(15));
        assert_eq!(config.backoff_factor, 2);
        assert_eq!(config.pacing_gap, Duration::from_secs(1));
    }

    // ==== execution ====

    #[tokio::test]
    async fn enqueue_resolves_success() {
        let queue = started_queue(fast_config());

        let result = queue
            .enqueue("test_op", || async { Ok(42) }.boxed())
            .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn failed_operation_retries_then_succeeds() {
        let queue = started_queue(fast_config());
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = queue
            .enqueue("flaky_op", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(TestError::Other("transient"))
                    } else {
                        Ok(7)
                    }
                }
                .boxed()
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_reject_with_operation_error() {
        let queue = started_queue(fast_config());
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = queue
            .enqueue("doomed_op", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>(TestError::Other("permanent"))
                }
                .boxed()
            })
            .await;

        match result {
            Err(QueueError::Operation(TestError::Other(msg))) => assert_eq!(msg, "permanent"),
            other => panic!("expected operation error, got {:?}", other),
        }
        // max_retries=2 means three executions total
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rate_limit_restores_retry_budget() {
        // max_retries=0 would reject any ordinary failure immediately,
        // so surviving two rate-limit hits proves they consume no budget
        let config = RetryQueueConfig {
            max_retries: 0,
            ..fast_config()
        };
        let queue = started_queue(config);
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = queue
            .enqueue("rate_limited_op", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(TestError::RateLimited)
                    } else {
                        Ok(11)
                    }
                }
                .boxed()
            })
            .await;

        assert_eq!(result.unwrap(), 11);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    // ==== ordering ====

    #[tokio::test]
    async fn operations_complete_in_fifo_order() {
        let queue = started_queue(fast_config());
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for name in ["a", "b", "c"] {
            let queue = queue.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(name, move || {
                        let order = order.clone();
                        async move {
                            order.lock().unwrap().push(name);
                            Ok(0)
                        }
                        .boxed()
                    })
                    .await
            }));
            // Give each enqueue time to land before the next
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn rate_limited_head_does_not_let_later_items_jump_ahead() {
        let queue = started_queue(fast_config());
        let order = Arc::new(Mutex::new(Vec::new()));

        // Head op: rate-limited once, then succeeds
        let a_attempts = Arc::new(AtomicU32::new(0));
        let a_handle = {
            let queue = queue.clone();
            let order = order.clone();
            let a_attempts = a_attempts.clone();
            tokio::spawn(async move {
                queue
                    .enqueue("a", move || {
                        let order = order.clone();
                        let a_attempts = a_attempts.clone();
                        async move {
                            if a_attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                                Err(TestError::RateLimited)
                            } else {
                                order.lock().unwrap().push("a");
                                Ok(0)
                            }
                        }
                        .boxed()
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(3)).await;

        // b and c arrive while a is paused on the rate limit
        let mut handles = vec![a_handle];
        for name in ["b", "c"] {
            let queue = queue.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(name, move || {
                        let order = order.clone();
                        async move {
                            order.lock().unwrap().push(name);
                            Ok(0)
                        }
                        .boxed()
                    })
                    .await
            }));
            tokio::time::sleep(Duration::from_millis(3)).await;
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn pacing_gap_spaces_consecutive_items() {
        let config = RetryQueueConfig {
            pacing_gap: Duration::from_millis(50),
            ..fast_config()
        };
        let queue = started_queue(config);

        let first = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .enqueue("first", || async { Ok(0) }.boxed())
                    .await
                    .unwrap();
                Instant::now()
            })
        };
        let second = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .enqueue("second", || async { Ok(0) }.boxed())
                    .await
                    .unwrap();
                Instant::now()
            })
        };

        let first_done = first.await.unwrap();
        let second_done = second.await.unwrap();
        let gap = second_done.saturating_duration_since(first_done);

        assert!(
            gap >= Duration::from_millis(50),
            "expected at least 50ms between items, got {:?}",
            gap
        );
    }

    // ==== clearing ====

    #[tokio::test]
    async fn clear_all_rejects_pending_and_in_flight() {
        let queue = started_queue(fast_config());

        // In-flight op that would take a long time
        let slow = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .enqueue("slow", || {
                        async {
                            tokio::time::sleep(Duration::from_secs(30)).await;
                            Ok(0)
                        }
                        .boxed()
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;

        // Pending op behind it
        let pending = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue.enqueue("pending", || async { Ok(0) }.boxed()).await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.clear_all().await;

        assert!(matches!(
            slow.await.unwrap(),
            Err(QueueError::Cancelled)
        ));
        assert!(matches!(
            pending.await.unwrap(),
            Err(QueueError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn clear_all_on_idle_queue_is_noop() {
        let queue = started_queue(fast_config());

        queue.clear_all().await;

        // Queue still works afterwards
        let result = queue.enqueue("after_clear", || async { Ok(5) }.boxed()).await;
        assert_eq!(result.unwrap(), 5);
    }

    #[tokio::test]
    async fn clear_all_during_backoff_rejects_head() {
        let queue = started_queue(RetryQueueConfig {
            max_retries: 2,
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2,
            pacing_gap: Duration::from_millis(1),
        });

        // Fails once, then would sleep 30s before the retry
        let handle = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .enqueue("backing_off", || {
                        async { Err::<u32, _>(TestError::Other("transient")) }.boxed()
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.clear_all().await;

        assert!(matches!(
            handle.await.unwrap(),
            Err(QueueError::Cancelled)
        ));
    }
}

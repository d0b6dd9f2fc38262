//! Async executor for bridging sync FUSE callbacks with async HTTP streams.
//!
//! FUSE callbacks are synchronous, while opening and reading a remote stream
//! is async. The executor owns its own Tokio runtime on a dedicated thread so
//! a callback never calls `block_on()` on a runtime worker.
//!
//! ```text
//! FUSE Thread                    Executor Thread
//! ───────────                    ───────────────
//!     │                               │
//!     │ submit(future) ──────────────►│
//!     │                               │ spawn task
//!     │ blocking_recv() ◄─────────────│ send result
//!     │                               │
//! ```
//!
//! [`AsyncExecutor::spawn`] is the non-blocking form: the callback hands over
//! the work together with a completion that sends the FUSE reply, and returns
//! at once. A slow stream then holds up only its own request.
//!
//! Every response body produced by the HTTP client is driven by this runtime,
//! so all opens and reads of one mount must go through the same executor.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Errors that can occur during executor operations.
#[derive(Debug, Clone)]
pub enum ExecutorError {
    /// The executor has been shut down or its thread died.
    Shutdown,
    /// The operation was cancelled (unmount in progress).
    Cancelled,
    /// The operation timed out.
    Timeout {
        /// The timeout that was exceeded.
        duration: Duration,
    },
    /// The runtime or its thread could not be started.
    Startup(String),
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorError::Shutdown => write!(f, "Executor has been shut down"),
            ExecutorError::Cancelled => write!(f, "Operation was cancelled"),
            ExecutorError::Timeout { duration } => {
                write!(f, "Operation timed out after {:?}", duration)
            }
            ExecutorError::Startup(msg) => write!(f, "Executor failed to start: {}", msg),
        }
    }
}

impl std::error::Error for ExecutorError {}

/// Configuration for the async executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Number of Tokio worker threads.
    pub worker_threads: usize,
    /// Channel buffer size for work submission.
    pub queue_size: usize,
    /// Timeout applied to every operation (None = wait for data, error or EOF).
    pub default_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            queue_size: 1024,
            default_timeout: None,
        }
    }
}

impl ExecutorConfig {
    /// Set the number of worker threads.
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads.max(1);
        self
    }

    /// Set the submission queue size.
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size.max(1);
        self
    }

    /// Set the default per-operation timeout.
    ///
    /// # Arguments
    /// * `timeout` - Timeout (None = no timeout)
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }
}

/// Async executor running on a dedicated background thread.
///
/// Results come back through a typed oneshot channel created per call.
pub struct AsyncExecutor {
    /// Channel to submit async work.
    tx: mpsc::Sender<BoxFuture<'static, ()>>,
    /// Cancelled on shutdown; in-flight operations observe it.
    cancel_token: CancellationToken,
    /// Background thread.
    thread: Option<JoinHandle<()>>,
    /// Whether the background loop is still running.
    running: Arc<AtomicBool>,
    /// Timeout applied by `block_on`.
    default_timeout: Option<Duration>,
}

impl AsyncExecutor {
    /// Start a runtime on a dedicated thread.
    ///
    /// # Arguments
    /// * `config` - Executor configuration
    pub fn new(config: ExecutorConfig) -> Result<Self, ExecutorError> {
        let runtime: Runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("s3fuse-io-worker")
            .enable_all()
            .build()
            .map_err(|e| ExecutorError::Startup(e.to_string()))?;

        let (tx, mut rx) = mpsc::channel::<BoxFuture<'static, ()>>(config.queue_size.max(1));
        let cancel_token: CancellationToken = CancellationToken::new();
        let token: CancellationToken = cancel_token.clone();
        let running: Arc<AtomicBool> = Arc::new(AtomicBool::new(true));
        let running_flag: Arc<AtomicBool> = running.clone();

        let thread: JoinHandle<()> = std::thread::Builder::new()
            .name("s3fuse-executor".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    loop {
                        tokio::select! {
                            biased;
                            _ = token.cancelled() => break,
                            item = rx.recv() => match item {
                                Some(work) => {
                                    tokio::spawn(work);
                                }
                                None => break,
                            },
                        }
                    }
                });
                running_flag.store(false, Ordering::Release);
                tracing::debug!("executor thread stopped");
            })
            .map_err(|e| ExecutorError::Startup(e.to_string()))?;

        Ok(Self {
            tx,
            cancel_token,
            thread: Some(thread),
            running,
            default_timeout: config.default_timeout,
        })
    }

    /// Run `future` on the executor and block until it completes.
    ///
    /// Applies the configured default timeout and aborts with `Cancelled` once
    /// [`cancel_all`](Self::cancel_all) has been called. Must not be called
    /// from inside a Tokio runtime.
    pub fn block_on<F, T>(&self, future: F) -> Result<T, ExecutorError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(guarded(self.cancel_token.clone(), self.default_timeout, future))?
    }

    /// Run `future` with an explicit timeout.
    ///
    /// # Arguments
    /// * `future` - The async operation
    /// * `timeout` - Maximum time to wait
    pub fn block_on_timeout<F, T>(&self, future: F, timeout: Duration) -> Result<T, ExecutorError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(guarded(self.cancel_token.clone(), Some(timeout), future))?
    }

    /// Run `future` on the executor without waiting for it.
    ///
    /// `complete` runs on the executor with the outcome, including timeout
    /// and cancellation. If the runtime stops before the work gets there,
    /// `complete` is dropped without running.
    ///
    /// # Returns
    /// `Shutdown` if the work could not be queued. `complete` has been dropped
    /// in that case too.
    pub fn spawn<F, T, C>(&self, future: F, complete: C) -> Result<(), ExecutorError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        C: FnOnce(Result<T, ExecutorError>) + Send + 'static,
    {
        if !self.is_running() {
            return Err(ExecutorError::Shutdown);
        }

        let bounded = guarded(self.cancel_token.clone(), self.default_timeout, future);
        let work: BoxFuture<'static, ()> = async move {
            complete(bounded.await);
        }
        .boxed();

        self.tx
            .blocking_send(work)
            .map_err(|_| ExecutorError::Shutdown)
    }

    fn submit<F, T>(&self, future: F) -> Result<T, ExecutorError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if !self.running.load(Ordering::Acquire) {
            return Err(ExecutorError::Shutdown);
        }

        let (result_tx, result_rx) = oneshot::channel::<T>();
        let work: BoxFuture<'static, ()> = async move {
            // Caller may have gone away; nothing to do then.
            let _ = result_tx.send(future.await);
        }
        .boxed();

        if self.tx.blocking_send(work).is_err() {
            return Err(ExecutorError::Shutdown);
        }

        result_rx.blocking_recv().map_err(|_| ExecutorError::Shutdown)
    }

    /// Cancel all in-flight operations and stop accepting new ones.
    ///
    /// Called on unmount.
    pub fn cancel_all(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the executor has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Check if the background loop is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Race `future` against cancellation and an optional timeout.
async fn guarded<F, T>(
    token: CancellationToken,
    timeout: Option<Duration>,
    future: F,
) -> Result<T, ExecutorError>
where
    F: Future<Output = T>,
{
    let bounded = async move {
        match timeout {
            Some(duration) => tokio::time::timeout(duration, future)
                .await
                .map_err(|_| ExecutorError::Timeout { duration }),
            None => Ok(future.await),
        }
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ExecutorError::Cancelled),
        result = bounded => result,
    }
}

impl Drop for AsyncExecutor {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

//! The batching engine.
//!
//! [`MessageBatcher`] accumulates opaque payloads and hands them to a
//! [`BatchSender`] when the next message would exceed the count or byte
//! threshold, when the periodic flush interval elapses, or when a flush is
//! requested explicitly. It also tracks the smallest [`Position`] among the
//! buffered messages so that callers only checkpoint past delivered data.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use prometheus_client::encoding::EncodeLabelValue;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::config::BatcherConfig;
use crate::error::{Error, Result};
use crate::metrics::BatcherMetrics;
use crate::position::Position;
use crate::sender::BatchSender;

/// What caused a batch to be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
pub enum FlushReason {
    /// The batch held `max_message_count` messages when another arrived.
    Count,
    /// The next message would have pushed the batch past `max_batch_bytes`.
    Size,
    /// A single message larger than `max_batch_bytes`, delivered alone.
    Oversize,
    /// The periodic flush interval elapsed.
    Interval,
    /// [`MessageBatcher::flush`] was called.
    Manual,
    /// [`MessageBatcher::close`] was called.
    Shutdown,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            FlushReason::Count => "count",
            FlushReason::Size => "size",
            FlushReason::Oversize => "oversize",
            FlushReason::Interval => "interval",
            FlushReason::Manual => "manual",
            FlushReason::Shutdown => "shutdown",
        };
        f.write_str(reason)
    }
}

/// Messages buffered since the last flush.
///
/// `smallest_position` is maintained incrementally as messages are pushed;
/// the per-message positions are not retained.
#[derive(Debug, Default)]
pub(crate) struct PendingBatch {
    messages: Vec<Bytes>,
    total_bytes: usize,
    smallest_position: Position,
}

impl PendingBatch {
    pub(crate) fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.messages.len()
    }

    pub(crate) fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub(crate) fn smallest_position(&self) -> &Position {
        &self.smallest_position
    }

    pub(crate) fn push(&mut self, payload: Bytes, position: Position) {
        self.total_bytes += payload.len();
        self.messages.push(payload);
        self.update_smallest_position(position);
    }

    fn update_smallest_position(&mut self, position: Position) {
        if self.smallest_position.is_empty() || position.is_less_than(&self.smallest_position) {
            self.smallest_position = position;
        }
    }

    pub(crate) fn messages(&self) -> &[Bytes] {
        &self.messages
    }

    /// Removes and returns every buffered message, resetting the byte total
    /// and the watermark.
    pub(crate) fn take(&mut self) -> Vec<Bytes> {
        self.total_bytes = 0;
        self.smallest_position = Position::Absent;
        std::mem::take(&mut self.messages)
    }
}

struct BatcherState {
    batch: PendingBatch,
    closed: bool,
}

struct Shared<S: BatchSender> {
    sender: S,
    config: BatcherConfig,
    metrics: Arc<BatcherMetrics>,
    state: Mutex<BatcherState>,
}

impl<S: BatchSender> Shared<S> {
    /// Delivers the pending batch if it holds anything.
    ///
    /// Callers hold the state lock for the duration, so batches reach the
    /// sender in the order their flush conditions were met. The batch is only
    /// cleared once the sender returns: if this future is dropped mid-send
    /// the messages and the watermark stay pending.
    async fn flush_pending(&self, batch: &mut PendingBatch, reason: FlushReason) {
        if batch.is_empty() {
            return;
        }
        self.deliver(batch.messages().to_vec(), batch.total_bytes(), reason)
            .await;
        batch.take();
        self.metrics.set_pending(0, 0);
    }

    async fn deliver(&self, messages: Vec<Bytes>, bytes: usize, reason: FlushReason) {
        let count = messages.len();
        tracing::debug!(%reason, messages = count, bytes, "flushing batch");
        self.sender.send_batch(messages).await;
        self.metrics.record_flush(reason, count, bytes);
    }
}

/// Handle to the background task driving interval flushes.
struct FlushTask {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl FlushTask {
    fn spawn<S: BatchSender>(shared: Arc<Shared<S>>) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let period = shared.config.flush_interval;
        let start = Instant::now() + period;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    // Resolves on an explicit shutdown or when the batcher
                    // is dropped along with the sender half.
                    _ = &mut shutdown_rx => break,

                    _ = ticker.tick() => {
                        // Run each tick on its own task so a panicking sender
                        // is reported instead of silently ending the timer.
                        let shared = shared.clone();
                        let tick = tokio::spawn(async move {
                            let mut state = shared.state.lock().await;
                            shared.flush_pending(&mut state.batch, FlushReason::Interval).await;
                        });
                        if let Err(e) = tick.await {
                            tracing::error!(error = %e, "interval flush failed, batch left pending");
                        }
                    }
                }
            }

            tracing::debug!("periodic flush task stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "periodic flush task did not exit cleanly");
        }
    }
}

/// Accumulates messages and releases them to a [`BatchSender`] in batches.
///
/// A batch is delivered when:
/// - it already holds `max_message_count` messages and another arrives,
/// - the next message would push its payload total past `max_batch_bytes`,
/// - the flush interval elapses while it is non-empty, or
/// - [`flush`](Self::flush) or [`close`](Self::close) is called.
///
/// A single message larger than `max_batch_bytes` bypasses the pending batch
/// and is delivered on its own.
///
/// # Concurrency
///
/// All methods take `&self`; share the batcher across tasks with an
/// [`Arc`]. A single lock guards the pending batch and is held while the
/// sender runs, so a slow sender blocks producers instead of letting batches
/// queue up, and batches are never reordered. A pending batch is cleared only
/// after the sender returns, so dropping an `add_message` or `flush` future
/// mid-delivery leaves the batch (and its watermark) pending; it is sent
/// again by the next flush. Senders should therefore tolerate redelivery.
///
/// # Example
///
/// ```ignore
/// let batcher = MessageBatcher::new(sender, Duration::from_secs(1), 500, 4 * 1024 * 1024)?;
/// batcher.add_message(Bytes::from("payload"), Position::new(42u64, 0)).await?;
///
/// // Checkpoint only below the oldest message that is still buffered.
/// let watermark = batcher.smallest_position().await;
///
/// batcher.close().await;
/// ```
pub struct MessageBatcher<S: BatchSender> {
    shared: Arc<Shared<S>>,
    flush_task: Mutex<Option<FlushTask>>,
}

impl<S: BatchSender> MessageBatcher<S> {
    /// Creates a batcher and starts its periodic flush task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if any threshold is zero.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn new(
        sender: S,
        flush_interval: Duration,
        max_message_count: usize,
        max_batch_bytes: usize,
    ) -> Result<Self> {
        Self::with_config(
            sender,
            BatcherConfig {
                flush_interval,
                max_message_count,
                max_batch_bytes,
            },
        )
    }

    /// Creates a batcher from a [`BatcherConfig`] with its own metrics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if any threshold is zero.
    pub fn with_config(sender: S, config: BatcherConfig) -> Result<Self> {
        Self::with_metrics(sender, config, Arc::new(BatcherMetrics::new()))
    }

    /// Creates a batcher that records into existing metrics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if any threshold is zero.
    pub fn with_metrics(
        sender: S,
        config: BatcherConfig,
        metrics: Arc<BatcherMetrics>,
    ) -> Result<Self> {
        config.validate()?;

        tracing::info!(
            flush_interval = ?config.flush_interval,
            max_message_count = config.max_message_count,
            max_batch_bytes = config.max_batch_bytes,
            "starting message batcher"
        );

        let shared = Arc::new(Shared {
            sender,
            config,
            metrics,
            state: Mutex::new(BatcherState {
                batch: PendingBatch::default(),
                closed: false,
            }),
        });
        let flush_task = FlushTask::spawn(shared.clone());

        Ok(Self {
            shared,
            flush_task: Mutex::new(Some(flush_task)),
        })
    }

    /// Adds a message to the pending batch, flushing first if it would not fit.
    ///
    /// The existing batch is delivered first when this message would push it
    /// past `max_message_count` or `max_batch_bytes`. A message larger than
    /// `max_batch_bytes` is then delivered alone, so a single call may invoke
    /// the sender twice.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyPayload`] if `payload` is empty. Nothing is changed.
    /// - [`Error::Closed`] if [`close`](Self::close) has been called.
    pub async fn add_message(&self, payload: Bytes, position: Position) -> Result<()> {
        let shared = &self.shared;
        if payload.is_empty() {
            shared.metrics.messages_rejected_total.inc();
            return Err(Error::EmptyPayload);
        }

        let mut state = shared.state.lock().await;
        if state.closed {
            return Err(Error::Closed);
        }

        let config = &shared.config;
        let size = payload.len();
        let batch = &mut state.batch;

        if batch.len() >= config.max_message_count {
            shared.flush_pending(batch, FlushReason::Count).await;
        } else if batch.total_bytes().saturating_add(size) > config.max_batch_bytes {
            shared.flush_pending(batch, FlushReason::Size).await;
        }

        if size > config.max_batch_bytes {
            shared.deliver(vec![payload], size, FlushReason::Oversize).await;
            return Ok(());
        }

        tracing::trace!(bytes = size, %position, "admitting message");
        batch.push(payload, position);
        shared.metrics.set_pending(batch.len(), batch.total_bytes());
        Ok(())
    }

    /// Delivers the pending batch now. Does nothing if it is empty.
    pub async fn flush(&self) {
        let mut state = self.shared.state.lock().await;
        self.shared
            .flush_pending(&mut state.batch, FlushReason::Manual)
            .await;
    }

    /// Returns the smallest position among messages not yet delivered.
    ///
    /// Returns [`Position::Absent`] when nothing is pending. A checkpoint may
    /// safely advance up to, but not including, this position.
    ///
    /// # Checkpointing
    ///
    /// Messages admitted with [`Position::Absent`] do not contribute to the
    /// watermark. If every pending message was admitted that way the result
    /// is `Absent` while [`pending_len`](Self::pending_len) is non-zero; read
    /// that as "unknown", not "nothing pending", and hold the checkpoint.
    pub async fn smallest_position(&self) -> Position {
        let state = self.shared.state.lock().await;
        state.batch.smallest_position().clone()
    }

    /// Number of messages waiting in the pending batch.
    pub async fn pending_len(&self) -> usize {
        self.shared.state.lock().await.batch.len()
    }

    /// Payload bytes waiting in the pending batch.
    pub async fn pending_bytes(&self) -> usize {
        self.shared.state.lock().await.batch.total_bytes()
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.shared.config
    }

    pub fn metrics(&self) -> &Arc<BatcherMetrics> {
        &self.shared.metrics
    }

    /// Stops the periodic flush task and delivers whatever is pending.
    ///
    /// Waits for an in-progress interval flush to finish first. Later calls
    /// to [`add_message`](Self::add_message) fail with [`Error::Closed`];
    /// `flush` and `smallest_position` keep working. Calling `close` again
    /// is a no-op.
    pub async fn close(&self) {
        let flush_task = self.flush_task.lock().await.take();
        if let Some(flush_task) = flush_task {
            flush_task.stop().await;
        }

        let mut state = self.shared.state.lock().await;
        if !state.closed {
            state.closed = true;
            tracing::info!(
                pending = state.batch.len(),
                "closing message batcher"
            );
        }
        self.shared
            .flush_pending(&mut state.batch, FlushReason::Shutdown)
            .await;
    }
}

impl<S: BatchSender> Drop for MessageBatcher<S> {
    fn drop(&mut self) {
        // Dropping the flush task's shutdown sender stops the timer.
        if let Ok(state) = self.shared.state.try_lock() {
            if !state.closed && !state.batch.is_empty() {
                tracing::warn!(
                    pending = state.batch.len(),
                    "message batcher dropped without close, pending messages were not delivered"
                );
            }
        }
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Delivers finished batches downstream.
///
/// The batcher awaits `send_batch` while holding its internal lock, so a slow
/// sender applies backpressure to every producer. Retries, backoff and
/// failure handling are the implementation's concern: the batcher neither
/// inspects nor retries deliveries.
#[async_trait]
pub trait BatchSender: Send + Sync + 'static {
    /// Deliver a batch. Payloads are in admission order.
    async fn send_batch(&self, batch: Vec<Bytes>);
}

#[async_trait]
impl<S: BatchSender + ?Sized> BatchSender for Arc<S> {
    async fn send_batch(&self, batch: Vec<Bytes>) {
        (**self).send_batch(batch).await
    }
}

/// Hands batches to a downstream task over a bounded channel.
///
/// Blocks while the channel is full. Batches sent after the receiver is
/// dropped are discarded.
#[async_trait]
impl BatchSender for mpsc::Sender<Vec<Bytes>> {
    async fn send_batch(&self, batch: Vec<Bytes>) {
        let messages = batch.len();
        if self.send(batch).await.is_err() {
            tracing::warn!(messages, "batch receiver dropped, discarding batch");
        }
    }
}

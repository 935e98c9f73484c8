//! Prometheus metrics for the message batcher.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use crate::batcher::FlushReason;

/// Labels for flush metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FlushLabels {
    pub reason: FlushReason,
}

/// Container for all batcher metrics.
///
/// One instance can be shared by several batchers (see
/// [`MessageBatcher::with_metrics`](crate::MessageBatcher::with_metrics)),
/// in which case the pending gauges reflect whichever batcher changed last.
pub struct BatcherMetrics {
    registry: Registry,

    /// Counter of delivered batches, by what triggered them.
    pub flushes_total: Family<FlushLabels, Counter>,

    /// Counter of messages handed to the sender.
    pub messages_flushed_total: Counter,

    /// Counter of payload bytes handed to the sender.
    pub bytes_flushed_total: Counter,

    /// Counter of empty payloads rejected by `add_message`.
    pub messages_rejected_total: Counter,

    /// Number of messages waiting in the pending batch.
    pub pending_messages: Gauge,

    /// Payload bytes waiting in the pending batch.
    pub pending_bytes: Gauge,
}

impl Default for BatcherMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BatcherMetrics {
    /// Create a new metrics registry with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let flushes_total = Family::<FlushLabels, Counter>::default();
        registry.register(
            "batcher_flushes",
            "Total number of batches delivered to the sender",
            flushes_total.clone(),
        );

        let messages_flushed_total = Counter::default();
        registry.register(
            "batcher_messages_flushed",
            "Total number of messages delivered to the sender",
            messages_flushed_total.clone(),
        );

        let bytes_flushed_total = Counter::default();
        registry.register(
            "batcher_bytes_flushed",
            "Total number of payload bytes delivered to the sender",
            bytes_flushed_total.clone(),
        );

        let messages_rejected_total = Counter::default();
        registry.register(
            "batcher_messages_rejected",
            "Total number of empty messages rejected",
            messages_rejected_total.clone(),
        );

        let pending_messages = Gauge::default();
        registry.register(
            "batcher_pending_messages",
            "Number of messages buffered and not yet delivered",
            pending_messages.clone(),
        );

        let pending_bytes = Gauge::default();
        registry.register(
            "batcher_pending_bytes",
            "Payload bytes buffered and not yet delivered",
            pending_bytes.clone(),
        );

        Self {
            registry,
            flushes_total,
            messages_flushed_total,
            bytes_flushed_total,
            messages_rejected_total,
            pending_messages,
            pending_bytes,
        }
    }

    pub(crate) fn record_flush(&self, reason: FlushReason, messages: usize, bytes: usize) {
        self.flushes_total
            .get_or_create(&FlushLabels { reason })
            .inc();
        self.messages_flushed_total.inc_by(messages as u64);
        self.bytes_flushed_total.inc_by(bytes as u64);
    }

    pub(crate) fn set_pending(&self, messages: usize, bytes: usize) {
        self.pending_messages
            .set(i64::try_from(messages).unwrap_or(i64::MAX));
        self.pending_bytes
            .set(i64::try_from(bytes).unwrap_or(i64::MAX));
    }

    /// Encode all metrics to Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry)
            .expect("encoding metrics should not fail");
        buffer
    }
}

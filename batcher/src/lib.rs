//! In-memory message batching for stream consumers.
//!
//! [`MessageBatcher`] sits between a record consumer and a downstream
//! [`BatchSender`]. It buffers opaque payloads and releases them in batches
//! bounded by message count, cumulative byte size and elapsed time, while
//! tracking the smallest [`Position`] still buffered so that checkpoints
//! never advance past undelivered data.

mod batcher;
mod config;
mod error;
pub mod metrics;
mod position;
mod sender;

pub use batcher::{FlushReason, MessageBatcher};
pub use config::BatcherConfig;
pub use error::{Error, Result};
pub use metrics::BatcherMetrics;
pub use position::{Position, SequenceNumber};
pub use sender::BatchSender;

//! Configuration for the message batcher.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Flush thresholds for a [`MessageBatcher`](crate::MessageBatcher).
///
/// A batch is released when the next message would push it past
/// `max_message_count` or `max_batch_bytes`, and at least once every
/// `flush_interval` while anything is pending.
///
/// Missing fields take their [`Default`] values when deserialised, so a host
/// process can embed this struct in its own configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    /// Interval at which pending messages are flushed regardless of size.
    pub flush_interval: Duration,
    /// Maximum number of messages in a single batch.
    pub max_message_count: usize,
    /// Maximum cumulative payload size of a batch, in bytes.
    ///
    /// A single message larger than this is delivered on its own.
    pub max_batch_bytes: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(1),
            max_message_count: 500,
            max_batch_bytes: 4 * 1024 * 1024, // 4 MiB
        }
    }
}

impl BatcherConfig {
    /// Checks that every threshold is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] naming the first field that
    /// is zero.
    pub fn validate(&self) -> Result<()> {
        if self.flush_interval.is_zero() {
            return Err(Error::InvalidConfiguration(
                "flush_interval must be greater than zero".to_string(),
            ));
        }
        if self.max_message_count == 0 {
            return Err(Error::InvalidConfiguration(
                "max_message_count must be greater than zero".to_string(),
            ));
        }
        if self.max_batch_bytes == 0 {
            return Err(Error::InvalidConfiguration(
                "max_batch_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

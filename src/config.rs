//! Policy knobs for transfer sessions.
use crate::{MAX_PART_COUNT, MIN_PART_SIZE};

use std::time::Duration;

/// `TransferConfig` sets the operational policy of a transfer session.
///
/// The defaults reproduce the stock behavior: a concurrency limit of twice
/// the available parallelism, a per-part retry budget of 3, and the S3 part
/// limits.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Limit to the number of concurrent part uploads.
    ///
    /// Defaults to `2 x` the parallelism available on the host.
    pub concurrency_limit: usize,
    /// Number of times a failed part upload is retried before the whole
    /// upload is aborted.
    ///
    /// Defaults to 3.
    pub retry_limit: u32,
    /// Minimum size of a part in bytes.
    ///
    /// Must be at least 5MiB, which is the default.
    pub min_part_size: u64,
    /// Maximum number of parts in an upload.
    ///
    /// Must be at most 10,000, which is the default.
    pub max_part_count: u64,
    /// Bound on the wait for the transport to confirm cancellation of
    /// in-flight part uploads during a pause.
    ///
    /// Defaults to 30 seconds.
    pub cancel_timeout: Duration,
    /// Validity window of the pre-signed URL issued for a part upload.
    ///
    /// Defaults to 1 hour.
    pub presign_expiry: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1);
        Self {
            concurrency_limit: parallelism * 2,
            retry_limit: 3,
            min_part_size: MIN_PART_SIZE,
            max_part_count: MAX_PART_COUNT,
            cancel_timeout: Duration::from_secs(30),
            presign_expiry: Duration::from_secs(3600),
        }
    }
}

impl TransferConfig {
    /// Set a limit to concurrent part upload tasks.
    pub fn concurrency_limit(self, limit: usize) -> Self {
        Self {
            concurrency_limit: std::cmp::max(limit, 1),
            ..self
        }
    }

    /// Set the number of retries granted to failing part uploads.
    pub fn retry_limit(self, limit: u32) -> Self {
        Self {
            retry_limit: limit,
            ..self
        }
    }

    /// Set the minimum number of bytes in a part.
    pub fn min_part_size(self, limit: u64) -> Self {
        Self {
            min_part_size: std::cmp::max(limit, MIN_PART_SIZE),
            ..self
        }
    }

    /// Set the maximum number of parts in an upload.
    pub fn max_part_count(self, limit: u64) -> Self {
        Self {
            max_part_count: limit.clamp(1, MAX_PART_COUNT),
            ..self
        }
    }

    /// Set the bound on the cancellation-confirmation wait during a pause.
    pub fn cancel_timeout(self, timeout: Duration) -> Self {
        Self {
            cancel_timeout: timeout,
            ..self
        }
    }

    /// Set the validity window for pre-signed part upload URLs.
    pub fn presign_expiry(self, expiry: Duration) -> Self {
        Self {
            presign_expiry: expiry,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_clamped() {
        let config = TransferConfig::default()
            .concurrency_limit(0)
            .min_part_size(1024)
            .max_part_count(1_000_000);
        assert_eq!(config.concurrency_limit, 1);
        assert_eq!(config.min_part_size, MIN_PART_SIZE);
        assert_eq!(config.max_part_count, MAX_PART_COUNT);
    }
}

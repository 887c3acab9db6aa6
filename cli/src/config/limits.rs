//! Bounds applied to configuration values before anything connects.

/// Azure Service Bus hard limit for messages per receive call
pub const MAX_RECEIVE_BATCH_SIZE: u32 = 2048;

/// Longest a single receive call may wait (10 minutes)
pub const MAX_RECEIVE_TIMEOUT_MS: u64 = 600_000;

/// Longest pause after a failed receive (1 minute)
pub const MAX_ERROR_BACKOFF_MS: u64 = 60_000;

/// Upper bound for `--count` on the send command
pub const MAX_SEND_COUNT: usize = 10_000;

//! Pieces shared by downloads and uploads: progress reporting and the
//! bounded retry used for transient network failures.

mod progress;
mod retry;

pub use progress::{format_size, LoggingProgress, ProgressObserver};
pub use retry::{with_retry, RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};

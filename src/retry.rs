//! Delete retry
//!
//! The transport does not retry failed calls. The single exception is
//! deleting a remote file the server still reports as processing: that call
//! is repeated a bounded number of times with a fixed delay.

use crate::cancel::{CancellationToken, run_cancellable};
use crate::result::OperationResult;
use std::future::Future;
use std::time::Duration;

/// Message returned by the API while an uploaded file is still being processed.
pub const STILL_PROCESSING_MESSAGE: &str = "File is still processing. Check back later.";

/// Fixed-delay retry for deletes of still-processing resources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteRetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay between attempts
    pub delay: Duration,
}

impl Default for DeleteRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

impl DeleteRetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Whether a result reports the resource as still processing.
    pub fn should_retry<T>(&self, result: &OperationResult<T>) -> bool {
        !result.is_success()
            && result
                .error()
                .is_some_and(|e| e.message.contains(STILL_PROCESSING_MESSAGE))
    }

    /// Run `operation` until it stops reporting "still processing" or the
    /// attempts are exhausted; the last result is returned unchanged.
    /// Cancelling `cancel` during a delay ends the loop with a cancelled result.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, operation: F) -> OperationResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = OperationResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = operation().await;
            if attempt >= max_attempts || !self.should_retry(&result) {
                return result;
            }
            tracing::warn!(
                target: "siumai_transport::retry",
                attempt,
                max_attempts,
                delay_ms = self.delay.as_millis() as u64,
                "resource still processing, retrying delete"
            );
            let delay = self.delay;
            let slept = run_cancellable(cancel, async move {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await;
            if let Err(e) = slept {
                return e.into();
            }
            attempt += 1;
        }
    }
}

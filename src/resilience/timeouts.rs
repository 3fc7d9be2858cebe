//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap backend calls with a deadline
//! - Keep timeouts distinct from other upstream errors
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the wrapped future is dropped on expiry,
//!   which closes the pending backend connection
//! - The deadline covers resolution and the wait for response headers, not
//!   a body stream that follows; a body the relay buffers (the status
//!   document) is read under the same deadline
//! - Timed-out requests return 504 Gateway Timeout

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("deadline of {0:?} exceeded")]
pub struct TimedOut(pub Duration);

/// A fixed deadline applied to one upstream exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Duration);

impl Deadline {
    pub fn new(limit: Duration) -> Self {
        Self(limit)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn limit(&self) -> Duration {
        self.0
    }

    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, TimedOut> {
        tokio::time::timeout(self.0, fut)
            .await
            .map_err(|_| TimedOut(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_within_deadline() {
        let deadline = Deadline::new(Duration::from_millis(200));
        assert_eq!(deadline.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn expires() {
        let deadline = Deadline::new(Duration::from_millis(50));
        let result = deadline
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert_eq!(result, Err(TimedOut(Duration::from_millis(50))));
    }
}

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::food::config::MAX_NETWORK_ATTEMPTS;
use crate::food::error::ServiceError;

/// How a single logical network call is bounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub timeout: Duration,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, timeout: Duration) -> Self {
        Self {
            attempts: attempts.clamp(1, MAX_NETWORK_ATTEMPTS),
            timeout,
            delay: Duration::from_millis(250),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Run `call` with a per-attempt timeout, retrying only retryable failures.
    pub async fn run<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut attempt = 1;
        loop {
            let result = match timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ServiceError::Timeout(self.timeout)),
            };
            match result {
                Err(e) if e.is_retryable() && attempt < self.attempts => {
                    log::warn!("{} failed (attempt {}/{}): {}", what, attempt, self.attempts, e);
                    attempt += 1;
                    sleep(self.delay * attempt).await;
                }
                other => return other,
            }
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use botkeeper_core::CommandError;

/// Bounded concurrency gate around handler execution.
///
/// A caller that cannot acquire a slot within the timeout is rejected
/// instead of queued, which bounds tail latency under load.
pub struct CommandRateLimiter {
    semaphore: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl CommandRateLimiter {
    pub fn new(capacity: usize, acquire_timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            acquire_timeout,
        }
    }

    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, CommandError> {
        let semaphore = Arc::clone(&self.semaphore);
        match tokio::time::timeout(self.acquire_timeout, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            // closed semaphore or timeout both shed the command
            Ok(Err(_)) | Err(_) => Err(CommandError::RateLimited),
        }
    }
}

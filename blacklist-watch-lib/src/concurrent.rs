//! Concurrency limiting for network and browser operations.
//!
//! Every lookup and submission runs under a permit from a shared
//! `ConcurrencyLimiter`. The limiter is a cheap handle: clones share the
//! same permit pool, so one pool can be handed to the first-lookup phase and
//! to every background poll.

use crate::error::BlacklistError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting permit pool capping simultaneous in-flight operations.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    /// Create a pool with `capacity` permits (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a permit. The permit is released when dropped.
    ///
    /// Suspends while the pool is exhausted; never drops work.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, BlacklistError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BlacklistError::internal("concurrency limiter closed"))
    }

    /// Run `operation` while holding a permit.
    ///
    /// The permit is released when the operation finishes, whether it
    /// succeeded or failed.
    pub async fn run<F>(&self, operation: F) -> Result<F::Output, BlacklistError>
    where
        F: Future,
    {
        let _permit = self.acquire().await?;
        Ok(operation.await)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(crate::types::DEFAULT_MAX_CONCURRENT)
    }
}

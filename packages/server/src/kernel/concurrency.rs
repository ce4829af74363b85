use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps in-flight calls to external services (platforms, tiers, scorer)
/// across every item a worker processes.
#[derive(Clone, Debug)]
pub struct ConcurrencyLimit {
    semaphore: Arc<Semaphore>,
    max: usize,
}

impl ConcurrencyLimit {
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Wait for a slot. The slot is released when the permit drops.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| anyhow!("concurrency limit closed"))
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_permits_are_released_on_drop() {
        let limit = ConcurrencyLimit::new(2);
        let first = limit.acquire().await.unwrap();
        let _second = limit.acquire().await.unwrap();
        assert_eq!(limit.available(), 0);

        drop(first);
        assert_eq!(limit.available(), 1);
    }

    #[test]
    fn test_zero_is_clamped() {
        assert_eq!(ConcurrencyLimit::new(0).max(), 1);
    }
}

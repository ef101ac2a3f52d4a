// src/engine/pool.rs

//! Execution slot pool: a counting permit pool bounding how many attempts
//! run at once.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::MAX_CONCURRENT_TASKS;
use crate::errors::{Result, TaskdagError};

/// Bounded concurrency gate.
///
/// Cloning is cheap; clones share the same permits.
#[derive(Debug, Clone)]
pub struct SlotPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A granted slot. Dropping it gives the slot back.
#[derive(Debug)]
pub struct SlotPermit {
    _permit: OwnedSemaphorePermit,
}

impl SlotPool {
    /// Fails for 0 and for anything above [`MAX_CONCURRENT_TASKS`].
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > MAX_CONCURRENT_TASKS {
            return Err(TaskdagError::ConfigError(format!(
                "max_concurrent_tasks must be in 1..={MAX_CONCURRENT_TASKS} (got {capacity})"
            )));
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Wait until a slot is free. Fails once the pool is closed.
    pub async fn acquire(&self) -> Result<SlotPermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TaskdagError::SlotAcquisitionCancelled)?;
        Ok(SlotPermit { _permit: permit })
    }

    /// Like [`acquire`](Self::acquire), but gives up once `cancel` fires.
    /// A fired token wins over a free slot.
    pub async fn acquire_or_cancel(&self, cancel: &CancellationToken) -> Result<SlotPermit> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TaskdagError::SlotAcquisitionCancelled),
            permit = self.acquire() => permit,
        }
    }

    pub fn release(&self, permit: SlotPermit) {
        drop(permit);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Fail every current and future `acquire`.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn capacity_outside_semaphore_range_is_rejected() {
        assert!(matches!(SlotPool::new(0), Err(TaskdagError::ConfigError(_))));
        assert!(matches!(
            SlotPool::new(MAX_CONCURRENT_TASKS + 1),
            Err(TaskdagError::ConfigError(_))
        ));
        assert!(matches!(
            SlotPool::new(usize::MAX),
            Err(TaskdagError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn release_returns_the_slot() {
        let pool = SlotPool::new(2).unwrap();
        let a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();
        assert_eq!(pool.in_use(), 2);
        assert_eq!(pool.available(), 0);

        pool.release(a);
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.in_use(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_release() {
        let pool = SlotPool::new(1).unwrap();
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        pool.release(held);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancelled_acquire_returns_typed_error_even_with_free_slots() {
        let pool = SlotPool::new(1).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let err = pool.acquire_or_cancel(&token).await.unwrap_err();
        assert!(matches!(err, TaskdagError::SlotAcquisitionCancelled));
        assert_eq!(pool.available(), 1);

        pool.close();
        assert!(pool.is_closed());
        assert!(matches!(
            pool.acquire().await,
            Err(TaskdagError::SlotAcquisitionCancelled)
        ));
    }
}

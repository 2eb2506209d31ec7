//! Concurrency slots for processing runs.
//!
//! A [`SlotPool`] wraps a Tokio semaphore whose permit count is the configured
//! maximum of concurrent processing runs. The coordinator acquires a [`Slot`]
//! before it spawns an execution unit and moves the slot into that unit; the
//! slot is released when the unit drops it, whatever the outcome.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
pub struct SlotPool {
    semaphore: Arc<Semaphore>,
    max_permits: usize,
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl SlotPool {
    /// # Panics
    ///
    /// Panics if `max_concurrent` is 0.
    pub fn new(max_concurrent: usize) -> Self {
        assert!(max_concurrent > 0, "max_concurrent must be > 0");

        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_permits: max_concurrent,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Waits until a slot is free and takes it.
    ///
    /// Fails only if the pool has been closed.
    pub async fn acquire(&self) -> Result<Slot, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;
        Ok(self.track(permit))
    }

    /// Takes a slot if one is free right now.
    pub fn try_acquire(&self) -> Option<Slot> {
        let permit = self.semaphore.clone().try_acquire_owned().ok()?;
        Some(self.track(permit))
    }

    /// Stops handing out slots; pending and future `acquire` calls fail.
    pub fn close(&self) {
        self.semaphore.close();
    }

    fn track(&self, permit: OwnedSemaphorePermit) -> Slot {
        let current = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters
            .peak_in_flight
            .fetch_max(current, Ordering::SeqCst);

        Slot {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_permits
    }

    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of slots ever held at once.
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// One held slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    #[should_panic(expected = "max_concurrent must be > 0")]
    fn zero_slots_is_rejected() {
        SlotPool::new(0);
    }

    #[tokio::test]
    async fn slots_are_capped_and_returned_on_drop() {
        let pool = SlotPool::new(2);

        let first = pool.acquire().await.unwrap();
        let second = pool.acquire().await.unwrap();
        assert_eq!(pool.in_flight(), 2);
        assert!(pool.try_acquire().is_none());

        drop(first);
        assert_eq!(pool.in_flight(), 1);
        let third = pool.try_acquire();
        assert!(third.is_some());

        drop(second);
        drop(third);
        assert_eq!(pool.in_flight(), 0);
        assert_eq!(pool.peak_in_flight(), 2);
    }

    #[tokio::test]
    async fn acquire_waits_for_a_release() {
        let pool = Arc::new(SlotPool::new(1));
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap().unwrap();
        assert_eq!(pool.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn closed_pool_fails_acquire() {
        let pool = SlotPool::new(1);
        pool.close();
        assert!(pool.acquire().await.is_err());
    }
}

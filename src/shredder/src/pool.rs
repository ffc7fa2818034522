//! Bounded worker pool shared by every unit of work in a deletion run.
//!
//! Item-level work (table size lookups) and statement-level work draw slots
//! from the same semaphore, so the number of backend calls in flight never
//! exceeds the pool size no matter how many items or conditions a run has.
//! A slot is held only for the duration of one backend call and never while
//! waiting on other units, which keeps nested scheduling free of deadlocks.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: NonZeroUsize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size.get())),
            size: size.get(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots not currently in use.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run `work` once a slot is free, holding the slot until it completes.
    pub async fn run<F, T>(&self, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("worker pool semaphore is never closed");
        work.await
    }
}

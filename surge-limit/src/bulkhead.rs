use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Why an admission request was rejected without running its job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BulkheadError {
    /// The wait for an execution slot exceeded the configured maximum.
    #[error("admission wait exceeded the configured maximum")]
    Timeout,

    /// The caller's cancellation signal fired while waiting for a slot.
    #[error("admission cancelled while waiting for a slot")]
    Cancelled,
}

/// A bounded concurrent-execution gate.
///
/// At most `workers` jobs execute at once. Callers beyond that enter a FIFO
/// wait queue and are admitted in arrival order as slots free up; a waiter
/// that hits `max_wait` or whose cancellation signal fires is rejected
/// without its job ever running, and is removed from the queue so it can
/// never be granted a slot later.
///
/// Queueing fairness and the atomic release-then-wake handoff are delegated
/// to tokio's semaphore, which queues waiters fairly and hands permits to the
/// front of the queue as they are released.
#[derive(Debug)]
pub struct Bulkhead {
    slots: Arc<Semaphore>,
    workers: usize,
    max_wait: Duration,
}

impl Bulkhead {
    pub fn new(workers: NonZeroUsize, max_wait: Duration) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(workers.get())),
            workers: workers.get(),
            max_wait,
        }
    }

    /// The configured worker capacity.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Execution slots currently free.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Acquire an execution slot, run `job` while holding it, release it.
    ///
    /// The slot is tied to a guard that drops on every exit path, so release
    /// is guaranteed even when the job errors or panics. Rejection happens
    /// strictly before the job is first polled.
    pub async fn admit<F>(
        &self,
        cancel: &CancellationToken,
        job: F,
    ) -> Result<F::Output, BulkheadError>
    where
        F: Future,
    {
        self.admit_within(cancel, self.max_wait, job).await
    }

    /// Like [`Bulkhead::admit`], with a per-admission wait budget instead of
    /// the configured default.
    pub async fn admit_within<F>(
        &self,
        cancel: &CancellationToken,
        max_wait: Duration,
        job: F,
    ) -> Result<F::Output, BulkheadError>
    where
        F: Future,
    {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BulkheadError::Cancelled),
            acquired = timeout(max_wait, Arc::clone(&self.slots).acquire_owned()) => {
                match acquired {
                    Ok(Ok(permit)) => permit,
                    // The semaphore is never closed.
                    Ok(Err(_)) => return Err(BulkheadError::Cancelled),
                    Err(_) => return Err(BulkheadError::Timeout),
                }
            }
        };
        let output = job.await;
        drop(permit);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use tokio::time::Instant;
    use tokio::time::sleep;

    use super::*;

    fn bulkhead(workers: usize, max_wait: Duration) -> Arc<Bulkhead> {
        Arc::new(Bulkhead::new(NonZeroUsize::new(workers).unwrap(), max_wait))
    }

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_worker_capacity() {
        let pool = bulkhead(2, Duration::from_millis(100));
        let cancel = CancellationToken::new();

        let out = pool.admit(&cancel, async { 42 }).await.unwrap();
        assert_eq!(out, 42);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn full_pool_rejects_waiter_after_max_wait() {
        let pool = bulkhead(2, Duration::from_millis(100));
        let cancel = CancellationToken::new();
        let ran = Arc::new(AtomicBool::new(false));

        let mut holders = Vec::new();
        for _ in 0..2 {
            let pool = Arc::clone(&pool);
            let cancel = cancel.clone();
            holders.push(tokio::spawn(async move {
                pool.admit(&cancel, sleep(Duration::from_secs(1))).await
            }));
        }
        tokio::task::yield_now().await;
        assert_eq!(pool.available(), 0);

        let ran_in_job = Arc::clone(&ran);
        let rejected = pool
            .admit(&cancel, async move {
                ran_in_job.store(true, Ordering::SeqCst);
            })
            .await;

        assert_eq!(rejected, Err(BulkheadError::Timeout));
        assert!(!ran.load(Ordering::SeqCst), "rejected job must never run");

        for holder in holders {
            holder.await.unwrap().unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_is_admitted_when_a_slot_frees_in_time() {
        let pool = bulkhead(1, Duration::from_millis(500));
        let cancel = CancellationToken::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let holder = {
            let pool = Arc::clone(&pool);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                pool.admit(&cancel, sleep(Duration::from_millis(100))).await
            })
        };
        tokio::task::yield_now().await;

        let runs_in_job = Arc::clone(&runs);
        pool.admit(&cancel, async move {
            runs_in_job.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        holder.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_unblocks_a_waiter_promptly() {
        let pool = bulkhead(1, Duration::from_secs(10));
        let cancel = CancellationToken::new();

        let holder = {
            let pool = Arc::clone(&pool);
            let hold = CancellationToken::new();
            tokio::spawn(async move {
                pool.admit(&hold, sleep(Duration::from_secs(5))).await
            })
        };
        tokio::task::yield_now().await;

        let waiter = {
            let pool = Arc::clone(&pool);
            let cancel = cancel.clone();
            tokio::spawn(async move { pool.admit(&cancel, async { 1 }).await })
        };
        tokio::task::yield_now().await;

        let before = Instant::now();
        cancel.cancel();
        let outcome = waiter.await.unwrap();

        assert_eq!(outcome, Err(BulkheadError::Cancelled));
        // The waiter unblocked on the signal, not on the timeout.
        assert!(before.elapsed() < Duration::from_millis(1));
        holder.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_are_granted_slots_in_arrival_order() {
        let pool = bulkhead(1, Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let holder = {
            let pool = Arc::clone(&pool);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                pool.admit(&cancel, sleep(Duration::from_millis(50))).await
            })
        };
        tokio::task::yield_now().await;

        let mut waiters = Vec::new();
        for id in 0..3 {
            let pool = Arc::clone(&pool);
            let cancel = cancel.clone();
            let order = Arc::clone(&order);
            waiters.push(tokio::spawn(async move {
                pool.admit(&cancel, async move {
                    order.lock().unwrap().push(id);
                })
                .await
            }));
            // Make sure each waiter joins the queue before the next arrives.
            tokio::task::yield_now().await;
        }

        holder.await.unwrap().unwrap();
        for waiter in waiters {
            waiter.await.unwrap().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn slot_is_released_when_the_job_fails() {
        let pool = bulkhead(1, Duration::from_millis(100));
        let cancel = CancellationToken::new();

        let failed: Result<Result<(), &str>, BulkheadError> =
            pool.admit(&cancel, async { Err("handler blew up") }).await;
        assert_eq!(failed, Ok(Err("handler blew up")));

        // The slot came back regardless of the job outcome.
        assert_eq!(pool.available(), 1);
        pool.admit(&cancel, async {}).await.unwrap();
    }

    #[tokio::test]
    async fn slot_is_released_when_the_job_panics() {
        let pool = bulkhead(1, Duration::from_millis(100));
        let cancel = CancellationToken::new();

        let panicking = {
            let pool = Arc::clone(&pool);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                pool.admit(&cancel, async { panic!("job panicked") }).await
            })
        };
        assert!(panicking.await.is_err());

        assert_eq!(pool.available(), 1);
        pool.admit(&cancel, async {}).await.unwrap();
    }
}

use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use quanta::Clock;
use quanta::Instant;
use tokio_util::sync::CancellationToken;

/// Failure modes of a blocking acquire.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AcquireError {
    /// The cancellation signal fired before a token became available.
    #[error("acquisition cancelled while waiting for tokens")]
    Cancelled,

    /// The request can never be satisfied because it exceeds burst capacity.
    #[error("requested {requested} tokens but burst capacity is {burst}")]
    ExceedsBurst { requested: f64, burst: f64 },
}

#[derive(Debug)]
struct State {
    tokens: f64,
    last: Instant,
}

/// A classic token bucket.
///
/// Tokens accrue at `rate` per second up to `burst` and are consumed per
/// admitted action. The refill-and-decide step runs as a single critical
/// section over the token count and the last-refill timestamp, so concurrent
/// callers can never jointly over-draw the bucket.
///
/// A `rate` of zero means the bucket never refills and only drains; a `burst`
/// of zero denies every request.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<State>,
    clock: Clock,
}

impl TokenBucket {
    /// Create a bucket that starts full.
    ///
    /// # Panics
    ///
    /// Panics if `rate` is negative or not finite.
    pub fn new(rate: f64, burst: u32) -> Self {
        Self::with_clock(rate, burst, Clock::new())
    }

    pub fn with_clock(rate: f64, burst: u32, clock: Clock) -> Self {
        assert!(
            rate >= 0.0 && rate.is_finite(),
            "refill rate must be finite and non-negative"
        );
        let now = clock.now();
        Self {
            rate,
            burst: f64::from(burst),
            state: Mutex::new(State {
                tokens: f64::from(burst),
                last: now,
            }),
            clock,
        }
    }

    /// The configured refill rate in tokens per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// The configured burst capacity.
    pub fn burst(&self) -> f64 {
        self.burst
    }

    /// Attempt to take a single token without blocking.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_n(1.0)
    }

    /// Attempt to take `n` tokens without blocking.
    ///
    /// Refills the bucket from elapsed wall-clock time, then grants the
    /// request only if at least `n` tokens remain. Denial leaves the token
    /// count untouched beyond the refill.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero, negative or not finite; that is a caller
    /// contract violation, not a rate-limit outcome.
    pub fn try_acquire_n(&self, n: f64) -> bool {
        assert!(n > 0.0 && n.is_finite(), "token request must be positive");
        let now = self.clock.now();
        let mut state = self.lock_state();
        self.refill(&mut state, now);
        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Suspend until a single token is available or `cancel` fires.
    pub async fn wait_acquire(&self, cancel: &CancellationToken) -> Result<(), AcquireError> {
        self.wait_acquire_n(1.0, cancel).await
    }

    /// Suspend until `n` tokens are available or `cancel` fires.
    ///
    /// The wait duration is computed exactly as `(n - tokens) / rate`; after
    /// sleeping it the bucket is re-checked rather than assumed refilled, so
    /// an early wake or a competing acquirer just leads to another round of
    /// waiting.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero, negative or not finite.
    pub async fn wait_acquire_n(
        &self,
        n: f64,
        cancel: &CancellationToken,
    ) -> Result<(), AcquireError> {
        assert!(n > 0.0 && n.is_finite(), "token request must be positive");
        if n > self.burst {
            return Err(AcquireError::ExceedsBurst {
                requested: n,
                burst: self.burst,
            });
        }
        loop {
            let wait = {
                let now = self.clock.now();
                let mut state = self.lock_state();
                self.refill(&mut state, now);
                if state.tokens >= n {
                    state.tokens -= n;
                    return Ok(());
                }
                if self.rate > 0.0 {
                    Some(Duration::from_secs_f64((n - state.tokens) / self.rate))
                } else {
                    // The bucket can only drain; nothing to do but wait for
                    // the cancellation signal.
                    None
                }
            };
            match wait {
                Some(wait) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(AcquireError::Cancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                None => {
                    cancel.cancelled().await;
                    return Err(AcquireError::Cancelled);
                }
            }
        }
    }

    /// How long until `n` tokens could be granted, after a refill.
    ///
    /// Returns `None` when the request can never succeed (`n` exceeds burst,
    /// or the bucket is exhausted and never refills), `Some(Duration::ZERO)`
    /// when it would succeed right now.
    pub fn retry_after(&self, n: f64) -> Option<Duration> {
        assert!(n > 0.0 && n.is_finite(), "token request must be positive");
        if n > self.burst {
            return None;
        }
        let now = self.clock.now();
        let mut state = self.lock_state();
        self.refill(&mut state, now);
        if state.tokens >= n {
            Some(Duration::ZERO)
        } else if self.rate > 0.0 {
            Some(Duration::from_secs_f64((n - state.tokens) / self.rate))
        } else {
            None
        }
    }

    /// The current token count, after a refill. Mostly useful for inspection.
    pub fn tokens(&self) -> f64 {
        let now = self.clock.now();
        let mut state = self.lock_state();
        self.refill(&mut state, now);
        state.tokens
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic can never occur between the refill and the decision, so a
        // poisoned lock still guards a consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refill(&self, state: &mut State, now: Instant) {
        // quanta instants are monotonic; duration_since saturates to zero if
        // `last` is somehow ahead, so the count never decreases from refill.
        let elapsed = now.duration_since(state.last);
        if self.rate > 0.0 {
            state.tokens = (state.tokens + elapsed.as_secs_f64() * self.rate).min(self.burst);
        }
        state.last = now;
    }
}

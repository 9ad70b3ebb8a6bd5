//! # surge-limit
//!
//! `surge-limit` provides the admission-control primitives used to protect a
//! service from overload: a per-key token bucket, a capacity-bounded store of
//! per-key limiters, and a bulkhead that bounds concurrent execution.
//!
//! ## Core Philosophy
//!
//! Excess work is rejected *before* it reaches business logic. The token
//! bucket answers "is this caller sending too fast?", the bulkhead answers
//! "are too many requests already executing?", and the store keeps one bucket
//! per caller without letting the key space grow without bound.
//!
//! ## Key Concepts
//!
//! * **Token bucket**: permits accrue at a fixed rate up to a burst cap and
//!   are consumed per admitted action. Refill is lazy, recalculated at the
//!   moment of the request; there are no background timers.
//! * **LRU store**: at most `capacity` distinct keys are retained; the least
//!   recently touched key is evicted to make room. Creation is single-flight
//!   per key.
//! * **Bulkhead**: at most `workers` jobs run at once; waiters queue FIFO and
//!   are rejected once `max_wait` elapses or their cancellation signal fires.
//!
//! ## Example
//!
//! ```rust
//! use surge_limit::TokenBucket;
//!
//! let bucket = TokenBucket::new(1.0, 3);
//!
//! // Burst capacity is available immediately.
//! assert!(bucket.try_acquire());
//! assert!(bucket.try_acquire());
//! assert!(bucket.try_acquire());
//! assert!(!bucket.try_acquire());
//! ```

mod bulkhead;
mod store;
mod token_bucket;

pub use bulkhead::Bulkhead;
pub use bulkhead::BulkheadError;
pub use store::FactoryError;
pub use store::LimiterFactory;
pub use store::LimiterStore;
pub use store::StoreError;
pub use token_bucket::AcquireError;
pub use token_bucket::TokenBucket;

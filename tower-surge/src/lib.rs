//! # Tower Surge
//!
//! `tower-surge` is a request admission-control stack for the
//! [Tower](https://github.com/tower-rs/tower) ecosystem. It rejects excess
//! work before it reaches business logic, using two independent, ordered
//! gates:
//!
//! 1. **Keyed rate limiting**: each calling identity gets its own token
//!    bucket, held in an LRU-bounded [`surge_limit::LimiterStore`]. A denial
//!    rejects with [`SurgeError::RateLimited`] immediately; the inner service
//!    never sees the request.
//! 2. **Bulkhead**: admitted requests pass through a
//!    [`surge_limit::Bulkhead`] that caps concurrent execution. Waiters queue
//!    FIFO and are shed with [`SurgeError::Overloaded`] once the admission
//!    timeout elapses.
//!
//! ## Example
//!
//! ```rust
//! use std::num::NonZeroUsize;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use surge_limit::{Bulkhead, FactoryError, LimiterStore, TokenBucket};
//! use tower_surge::AdmissionLayer;
//!
//! let factory = |_key: &str| -> Result<TokenBucket, FactoryError> {
//!     Ok(TokenBucket::new(10.0, 20))
//! };
//! let store = Arc::new(LimiterStore::new(NonZeroUsize::new(1024).unwrap(), factory));
//! let bulkhead = Arc::new(Bulkhead::new(
//!     NonZeroUsize::new(8).unwrap(),
//!     Duration::from_millis(500),
//! ));
//!
//! let layer: AdmissionLayer<String> =
//!     AdmissionLayer::new(store, bulkhead, |req: &String| req.clone());
//! ```
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`SurgeError`], allowing automatic
//!   conversion to HTTP status codes (429, 408, 500).

mod config;
mod error;
mod key;
mod layer;
mod service;


pub use config::AdmissionConfig;
pub use config::ConfigError;
pub use error::SurgeError;
pub use key::KeyExtractor;
pub use layer::AdmissionLayer;
pub use service::AdmissionService;

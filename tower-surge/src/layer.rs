use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower::Layer;

use surge_limit::Bulkhead;
use surge_limit::FactoryError;
use surge_limit::LimiterStore;
use surge_limit::TokenBucket;

use crate::config::AdmissionConfig;
use crate::config::ConfigError;
use crate::key::KeyExtractor;
use crate::service::AdmissionService;

/// Applies keyed admission control to requests.
///
/// Composes a [`LimiterStore`] (per-key rate limiting) and a [`Bulkhead`]
/// (bounded concurrent execution) in that order around the inner service.
/// Both collaborators are shared across every service the layer produces, so
/// clones of the stack enforce one set of limits.
pub struct AdmissionLayer<Req> {
    store: Arc<LimiterStore>,
    bulkhead: Arc<Bulkhead>,
    key_of: Arc<dyn KeyExtractor<Req>>,
    cancel: CancellationToken,
}

impl<Req> Clone for AdmissionLayer<Req> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            bulkhead: Arc::clone(&self.bulkhead),
            key_of: Arc::clone(&self.key_of),
            cancel: self.cancel.clone(),
        }
    }
}

impl<Req> std::fmt::Debug for AdmissionLayer<Req> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionLayer")
            .field("store", &self.store)
            .field("bulkhead", &self.bulkhead)
            .finish_non_exhaustive()
    }
}

impl<Req> AdmissionLayer<Req> {
    /// Create a layer from explicitly constructed collaborators.
    pub fn new(
        store: Arc<LimiterStore>,
        bulkhead: Arc<Bulkhead>,
        key_of: impl KeyExtractor<Req> + 'static,
    ) -> Self {
        Self {
            store,
            bulkhead,
            key_of: Arc::new(key_of),
            cancel: CancellationToken::new(),
        }
    }

    /// Build the whole admission stack from a validated configuration.
    ///
    /// Every key shares the same rate/burst policy. For per-key policy,
    /// construct the [`LimiterStore`] with a custom factory and use
    /// [`AdmissionLayer::new`].
    pub fn from_config(
        config: &AdmissionConfig,
        key_of: impl KeyExtractor<Req> + 'static,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let rate = config.rate;
        let burst = config.burst;
        let factory =
            move |_key: &str| -> Result<TokenBucket, FactoryError> {
                Ok(TokenBucket::new(rate, burst))
            };
        // validate() guarantees these are non-zero.
        let capacity = NonZeroUsize::new(config.cache_capacity).ok_or(
            ConfigError::NotPositive {
                field: "cache_capacity",
                value: 0.0,
            },
        )?;
        let workers =
            NonZeroUsize::new(config.workers).ok_or(ConfigError::NotPositive {
                field: "workers",
                value: 0.0,
            })?;
        Ok(Self::new(
            Arc::new(LimiterStore::new(capacity, factory)),
            Arc::new(Bulkhead::new(workers, config.max_wait)),
            key_of,
        ))
    }

    /// Use `cancel` as the admission cancel signal, typically tied to server
    /// shutdown. Waiting requests observe it promptly and fail with
    /// [`crate::SurgeError::Cancelled`].
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The store backing this layer, e.g. for deleting a client's key.
    pub fn store(&self) -> &Arc<LimiterStore> {
        &self.store
    }

    /// The bulkhead backing this layer.
    pub fn bulkhead(&self) -> &Arc<Bulkhead> {
        &self.bulkhead
    }
}

impl<S, Req> Layer<S> for AdmissionLayer<Req> {
    type Service = AdmissionService<S, Req>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService::new(
            inner,
            Arc::clone(&self.store),
            Arc::clone(&self.bulkhead),
            Arc::clone(&self.key_of),
            self.cancel.clone(),
        )
    }
}

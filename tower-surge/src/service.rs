use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use futures::future::BoxFuture;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tower::Service;

use surge_limit::Bulkhead;
use surge_limit::BulkheadError;
use surge_limit::LimiterStore;

use crate::SurgeError;
use crate::key::KeyExtractor;

#[derive(Clone, Debug)]
struct AdmissionMetrics {
    rate_limited: Counter<u64>,
    shed: Counter<u64>,
    cancelled: Counter<u64>,
}

impl AdmissionMetrics {
    fn new() -> Self {
        let meter = global::meter("admission_service");
        Self {
            rate_limited: meter.u64_counter("rate_limited").build(),
            shed: meter.u64_counter("shed").build(),
            cancelled: meter.u64_counter("cancelled").build(),
        }
    }
}

/// Intercepts every request with two independent, ordered gates.
///
/// First the caller's token bucket (cheap, per-key): a denial rejects with
/// [`SurgeError::RateLimited`] before the bulkhead is touched and before the
/// inner service sees the request. Then the bulkhead (shared): the inner call
/// runs while holding one of its execution slots, or the request is shed.
pub struct AdmissionService<S, Req> {
    inner: S,
    store: Arc<LimiterStore>,
    bulkhead: Arc<Bulkhead>,
    key_of: Arc<dyn KeyExtractor<Req>>,
    cancel: CancellationToken,
    instruments: AdmissionMetrics,
}

impl<S, Req> std::fmt::Debug for AdmissionService<S, Req>
where
    S: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionService")
            .field("inner", &self.inner)
            .field("store", &self.store)
            .field("bulkhead", &self.bulkhead)
            .finish_non_exhaustive()
    }
}

impl<S, Req> Clone for AdmissionService<S, Req>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            store: Arc::clone(&self.store),
            bulkhead: Arc::clone(&self.bulkhead),
            key_of: Arc::clone(&self.key_of),
            cancel: self.cancel.clone(),
            instruments: self.instruments.clone(),
        }
    }
}

impl<S, Req> AdmissionService<S, Req> {
    pub fn new(
        inner: S,
        store: Arc<LimiterStore>,
        bulkhead: Arc<Bulkhead>,
        key_of: Arc<dyn KeyExtractor<Req>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            store,
            bulkhead,
            key_of,
            cancel,
            instruments: AdmissionMetrics::new(),
        }
    }
}

impl<S, Req> Service<Req> for AdmissionService<S, Req>
where
    S: Service<Req, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let key = self.key_of.key(&req);
        let store = Arc::clone(&self.store);
        let bulkhead = Arc::clone(&self.bulkhead);
        let cancel = self.cancel.clone();
        let instruments = self.instruments.clone();

        // The clone takes over; `self.inner` was driven to readiness by the
        // caller, so the swapped-in instance is the one we may call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let limiter = match store.get_or_create(&key) {
                Ok(limiter) => limiter,
                Err(err) => {
                    return Err(BoxError::from(SurgeError::Factory(err.to_string())));
                }
            };

            if !limiter.try_acquire() {
                instruments
                    .rate_limited
                    .add(1, &[KeyValue::new("key", key)]);
                return Err(BoxError::from(SurgeError::RateLimited {
                    retry_after: limiter.retry_after(1.0),
                }));
            }

            match bulkhead.admit(&cancel, async move { inner.call(req).await }).await {
                Ok(result) => result,
                Err(BulkheadError::Timeout) => {
                    instruments.shed.add(1, &[KeyValue::new("key", key)]);
                    Err(BoxError::from(SurgeError::Overloaded))
                }
                Err(BulkheadError::Cancelled) => {
                    instruments.cancelled.add(1, &[KeyValue::new("key", key)]);
                    Err(BoxError::from(SurgeError::Cancelled))
                }
            }
        })
    }
}

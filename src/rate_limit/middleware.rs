use crate::error::TrafficError;
use crate::rate_limit::{Decision, FailurePolicy, RateLimiter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::BoxError;
use tower_layer::Layer;
use tower_service::Service;

/// Layer that throttles requests by a key extracted from each request.
///
/// `key_fn` maps a request to its throttle key (client address, API token,
/// tenant id). A denied key fails with
/// [`TrafficError::ResourceExhausted`]; a store failure under
/// [`FailurePolicy::FailClosed`] fails with [`TrafficError::Store`]. Either way
/// the inner service is never called.
#[derive(Debug)]
pub struct RateLimitLayer<L, K> {
    limiter: Arc<L>,
    key_fn: K,
}

impl<L, K: Clone> Clone for RateLimitLayer<L, K> {
    fn clone(&self) -> Self {
        Self { limiter: self.limiter.clone(), key_fn: self.key_fn.clone() }
    }
}

impl<L, K> RateLimitLayer<L, K> {
    /// Throttle with `limiter`, keyed by `key_fn`.
    pub fn new(limiter: L, key_fn: K) -> Self {
        Self::from_arc(Arc::new(limiter), key_fn)
    }

    /// Share an existing limiter with other layers.
    pub fn from_arc(limiter: Arc<L>, key_fn: K) -> Self {
        Self { limiter, key_fn }
    }
}

impl<S, L, K> Layer<S> for RateLimitLayer<L, K>
where
    K: Clone,
{
    type Service = RateLimitService<S, L, K>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService {
            inner: service,
            limiter: self.limiter.clone(),
            key_fn: self.key_fn.clone(),
        }
    }
}

/// Service produced by [`RateLimitLayer`].
#[derive(Debug)]
pub struct RateLimitService<S, L, K> {
    inner: S,
    limiter: Arc<L>,
    key_fn: K,
}

impl<S: Clone, L, K: Clone> Clone for RateLimitService<S, L, K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
            key_fn: self.key_fn.clone(),
        }
    }
}

impl<S, L, K, Req> Service<Req> for RateLimitService<S, L, K>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
    L: RateLimiter + 'static,
    K: Fn(&Req) -> String,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let key = (self.key_fn)(&req);
        let limiter = self.limiter.clone();
        // The readied service goes into the future; a fresh clone stays behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match limiter.evaluate(&key).await {
                Decision::Allowed { .. } => inner.call(req).await.map_err(Into::into),
                Decision::Denied { .. } => Err(TrafficError::ResourceExhausted { key }.into()),
                Decision::Degraded { policy: FailurePolicy::FailOpen, .. } => {
                    inner.call(req).await.map_err(Into::into)
                }
                Decision::Degraded { policy: FailurePolicy::FailClosed, error } => {
                    Err(TrafficError::Store(error).into())
                }
            }
        })
    }
}

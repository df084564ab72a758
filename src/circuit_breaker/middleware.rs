use super::{Breaker, CircuitBreakerGate};
use crate::telemetry::{NullSink, TelemetrySink};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::BoxError;
use tower_layer::Layer;
use tower_service::Service;

/// Layer that runs every request of the wrapped service through a
/// [`CircuitBreakerGate`]. All services built from one layer share the gate.
#[derive(Debug)]
pub struct CircuitBreakerLayer<B, T = NullSink> {
    gate: Arc<CircuitBreakerGate<B, T>>,
}

impl<B, T> Clone for CircuitBreakerLayer<B, T> {
    fn clone(&self) -> Self {
        Self { gate: self.gate.clone() }
    }
}

impl<B: Breaker> CircuitBreakerLayer<B> {
    /// Gate requests through `breaker`.
    pub fn new(breaker: B) -> Self {
        Self::from_gate(CircuitBreakerGate::new(breaker))
    }
}

impl<B, T> CircuitBreakerLayer<B, T> {
    /// Use a gate configured elsewhere (for example with a telemetry sink).
    pub fn from_gate(gate: CircuitBreakerGate<B, T>) -> Self {
        Self { gate: Arc::new(gate) }
    }

    /// The shared gate.
    pub fn gate(&self) -> &Arc<CircuitBreakerGate<B, T>> {
        &self.gate
    }
}

impl<S, B, T> Layer<S> for CircuitBreakerLayer<B, T> {
    type Service = CircuitBreakerService<S, B, T>;

    fn layer(&self, service: S) -> Self::Service {
        CircuitBreakerService { inner: service, gate: self.gate.clone() }
    }
}

/// Service produced by [`CircuitBreakerLayer`].
#[derive(Debug)]
pub struct CircuitBreakerService<S, B, T = NullSink> {
    inner: S,
    gate: Arc<CircuitBreakerGate<B, T>>,
}

impl<S: Clone, B, T> Clone for CircuitBreakerService<S, B, T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), gate: self.gate.clone() }
    }
}

impl<S, B, T, Req> Service<Req> for CircuitBreakerService<S, B, T>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Into<BoxError>,
    B: Breaker + 'static,
    T: TelemetrySink + Sync,
    T::Future: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let gate = self.gate.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            gate.guard(move || {
                let response = inner.call(req);
                async move { response.await.map_err(Into::<BoxError>::into) }
            })
            .await
            .map_err(Into::into)
        })
    }
}

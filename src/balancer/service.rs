use super::picker::{CallOutcome, WeightedPicker};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{BoxError, ServiceExt};
use tower_service::Service;

/// Client-side service that routes every request to the backend chosen by a
/// [`WeightedPicker`].
///
/// The picker is injected explicitly; discovery keeps it current through
/// [`WeightedPicker::rebuild`] or [`WeightedPicker::follow`] on the same `Arc`.
/// Each call picks once, then drives the chosen handle through
/// `ready` + `call`. An empty set fails the call with
/// [`TrafficError::NoCandidate`](crate::TrafficError::NoCandidate).
#[derive(Debug)]
pub struct Balance<H> {
    picker: Arc<WeightedPicker<H>>,
}

impl<H> Clone for Balance<H> {
    fn clone(&self) -> Self {
        Self { picker: self.picker.clone() }
    }
}

impl<H> Balance<H> {
    /// Route calls through `picker`.
    pub fn new(picker: Arc<WeightedPicker<H>>) -> Self {
        Self { picker }
    }

    /// The picker backing this service.
    pub fn picker(&self) -> &Arc<WeightedPicker<H>> {
        &self.picker
    }
}

impl<H, Req> Service<Req> for Balance<H>
where
    H: Service<Req> + Clone + Send + 'static,
    H::Future: Send + 'static,
    H::Response: Send + 'static,
    H::Error: Into<BoxError>,
    Req: Send + 'static,
{
    type Response = H::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness belongs to the backend picked in `call`.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let picked = match self.picker.pick() {
            Ok(picked) => picked,
            Err(err) => {
                tracing::debug!("no backend candidate for outbound call");
                return Box::pin(async move { Err(err.into()) });
            }
        };
        let (backend, completion) = picked.into_parts();

        Box::pin(async move {
            let result = backend.oneshot(req).await.map_err(Into::into);
            completion.done(match &result {
                Ok(_) => CallOutcome::Success,
                Err(_) => CallOutcome::Failure,
            });
            result
        })
    }
}

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::BoxError;
use tower_service::Service;

/// Route `tracing` output through the test harness so it shows on failure.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Inbound request as seen by the stack under test.
#[derive(Debug, Clone)]
pub struct Request {
    pub peer: &'static str,
    pub fail: bool,
}

impl Request {
    pub fn ok(peer: &'static str) -> Self {
        Self { peer, fail: false }
    }

    pub fn failing(peer: &'static str) -> Self {
        Self { peer, fail: true }
    }
}

pub fn peer_key(req: &Request) -> String {
    req.peer.to_owned()
}

/// Handler that fails on request and counts invocations.
#[derive(Debug, Clone, Default)]
pub struct Handler {
    calls: Arc<AtomicUsize>,
}

impl Handler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Service<Request> for Handler {
    type Response = String;
    type Error = BoxError;
    type Future = futures::future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        self.calls.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(if req.fail {
            Err(format!("handler failed for {}", req.peer).into())
        } else {
            Ok(format!("served {}", req.peer))
        })
    }
}

//! Pre-composed middleware stacks.
//!
//! ## Quick Start
//!
//! ```rust
//! use meshgate::circuit_breaker::ConsecutiveFailureBreaker;
//! use meshgate::presets;
//! use meshgate::rate_limit::{InMemoryWindowStore, SlidingWindowLimiter, WindowConfig};
//! use std::time::Duration;
//! use tower::{service_fn, ServiceExt};
//!
//! #[derive(Debug)]
//! struct Request {
//!     peer: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tower::BoxError> {
//!     let limiter = SlidingWindowLimiter::new(
//!         InMemoryWindowStore::new(),
//!         WindowConfig::new(Duration::from_secs(1), 100)?,
//!     );
//!     let handler = service_fn(|req: Request| async move {
//!         Ok::<_, std::io::Error>(format!("hello {}", req.peer))
//!     });
//!     let svc = presets::inbound(
//!         handler,
//!         limiter,
//!         |req: &Request| req.peer.clone(),
//!         ConsecutiveFailureBreaker::default(),
//!     );
//!
//!     let reply = svc.oneshot(Request { peer: "10.0.0.7".into() }).await?;
//!     assert_eq!(reply, "hello 10.0.0.7");
//!     Ok(())
//! }
//! ```

use crate::circuit_breaker::{Breaker, CircuitBreakerLayer, CircuitBreakerService};
use crate::rate_limit::{RateLimitLayer, RateLimitService};
use tower::ServiceBuilder;

/// Inbound server stack: rate limiting, then the breaker gate, then `service`.
///
/// **Layering Order:** RateLimit → CircuitBreakerGate → Your Service
///
/// A throttled request stops at the limiter and never reaches the breaker, so
/// rejections do not count as failures. Errors are `tower::BoxError`; use
/// [`classify`](crate::classify) to map them to a status code.
pub fn inbound<S, L, K, B>(
    service: S,
    limiter: L,
    key_fn: K,
    breaker: B,
) -> RateLimitService<CircuitBreakerService<S, B>, L, K>
where
    K: Clone,
    B: Breaker,
{
    ServiceBuilder::new()
        .layer(RateLimitLayer::new(limiter, key_fn))
        .layer(CircuitBreakerLayer::new(breaker))
        .service(service)
}

#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # meshgate
//!
//! Traffic control for RPC service meshes, built on tower.
//!
//! ## Features
//!
//! - **Weighted picker**: smooth weighted round robin over discovered backends
//! - **Sliding-window rate limiter** backed by a shared store, fail-closed by default
//! - **Circuit breaker gate** sequencing a pluggable breaker around each call
//! - **tower middleware** for all three, plus an inbound preset
//!
//! ## Quick Start
//!
//! ```rust
//! use meshgate::balancer::{Candidate, WeightedPicker};
//!
//! let picker = WeightedPicker::new();
//! picker.rebuild(vec![
//!     Candidate::new("10.0.0.1:7000", "conn-a", 3).unwrap(),
//!     Candidate::new("10.0.0.2:7000", "conn-b", 1).unwrap(),
//! ]);
//!
//! let picked = picker.pick().unwrap();
//! assert_eq!(picked.id(), "10.0.0.1:7000");
//! assert_eq!(*picked.handle(), "conn-a");
//! ```
//!
//! Inbound calls go through [`presets::inbound`]: the rate limiter rejects a
//! throttled key with [`Code::ResourceExhausted`] before the breaker gate runs.

pub mod adaptive;
pub mod balancer;
pub mod circuit_breaker;
pub mod clock;
pub mod error;
pub mod prelude;
pub mod presets;
pub mod rate_limit;
pub mod telemetry;

// Re-exports
pub use adaptive::DynamicConfig;
pub use balancer::{Balance, CallOutcome, Candidate, CandidateError, Picked, WeightedPicker};
pub use circuit_breaker::{
    Breaker, BreakerConfigError, BreakerOpen, BreakerState, CircuitBreakerConfig,
    CircuitBreakerGate, CircuitBreakerLayer, ConsecutiveFailureBreaker,
};
pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use error::{classify, Code, StoreError, TrafficError, UnavailableCause};
pub use rate_limit::{
    Decision, FailurePolicy, InMemoryWindowStore, RateLimitLayer, RateLimiter,
    SlidingWindowLimiter, WindowConfig, WindowConfigError, WindowStore,
};

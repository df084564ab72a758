//! Convenient re-exports for common meshgate types.
pub use crate::{
    adaptive::DynamicConfig,
    balancer::{Balance, CallOutcome, Candidate, Picked, WeightedPicker},
    circuit_breaker::{
        Breaker, BreakerOpen, CircuitBreakerConfig, CircuitBreakerGate, CircuitBreakerLayer,
        ConsecutiveFailureBreaker,
    },
    clock::{Clock, ManualClock, SystemClock},
    error::{classify, Code, TrafficError},
    rate_limit::{
        FailurePolicy, InMemoryWindowStore, RateLimitLayer, SlidingWindowLimiter, WindowConfig,
        WindowStore,
    },
};

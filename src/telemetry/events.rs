use crate::error::UnavailableCause;
use std::fmt;
use std::time::Duration;

#[cfg(feature = "telemetry-json")]
use serde_json::json;

/// Admission decisions emitted by the rate limiter and the breaker gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrafficEvent {
    /// Sliding-window rate limiter decisions.
    RateLimit(RateLimitEvent),
    /// Breaker gate decisions.
    Gate(GateEvent),
}

/// Events emitted by the sliding-window rate limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitEvent {
    /// The store recorded an event for the key.
    Allowed {
        /// Throttled key.
        key: String,
        /// Events in the window, including this one.
        in_window: u32,
    },
    /// The key already reached its threshold; nothing was recorded.
    Denied {
        /// Throttled key.
        key: String,
        /// Events in the window at decision time.
        in_window: u32,
    },
    /// The store call failed and the failure policy decided the outcome.
    StoreFailed {
        /// Throttled key.
        key: String,
        /// Whether the failure policy let the request through.
        admitted: bool,
    },
}

/// Events emitted by the breaker gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    /// The gate answered `Unavailable`.
    ///
    /// `BreakerOpen` means the operation never ran; `OperationFailed` means it
    /// ran, failed, and was reported to the breaker.
    Rejected {
        /// Internal reason behind the rejection.
        cause: UnavailableCause,
    },
    /// The guarded operation succeeded and was reported to the breaker.
    Succeeded {
        /// Time spent inside the operation.
        duration: Duration,
    },
}

impl fmt::Display for TrafficEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrafficEvent::RateLimit(event) => write!(f, "rate limit {}", event),
            TrafficEvent::Gate(event) => write!(f, "gate {}", event),
        }
    }
}

impl fmt::Display for RateLimitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitEvent::Allowed { key, in_window } => {
                write!(f, "allowed key={} in_window={}", key, in_window)
            }
            RateLimitEvent::Denied { key, in_window } => {
                write!(f, "denied key={} in_window={}", key, in_window)
            }
            RateLimitEvent::StoreFailed { key, admitted } => {
                write!(f, "store failed key={} admitted={}", key, admitted)
            }
        }
    }
}

impl fmt::Display for GateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateEvent::Rejected { cause } => write!(f, "rejected ({})", cause.as_str()),
            GateEvent::Succeeded { duration } => write!(f, "succeeded ({:?})", duration),
        }
    }
}

/// Convert a [`TrafficEvent`] into a JSON value for log shippers.
#[cfg(feature = "telemetry-json")]
pub fn event_to_json(event: &TrafficEvent) -> serde_json::Value {
    match event {
        TrafficEvent::RateLimit(r) => match r {
            RateLimitEvent::Allowed { key, in_window } => {
                json!({ "kind": "rate_limit_allowed", "key": key, "in_window": *in_window })
            }
            RateLimitEvent::Denied { key, in_window } => {
                json!({ "kind": "rate_limit_denied", "key": key, "in_window": *in_window })
            }
            RateLimitEvent::StoreFailed { key, admitted } => {
                json!({ "kind": "rate_limit_store_failed", "key": key, "admitted": *admitted })
            }
        },
        TrafficEvent::Gate(g) => match g {
            GateEvent::Rejected { cause } => {
                json!({ "kind": "gate_rejected", "cause": cause.as_str() })
            }
            GateEvent::Succeeded { duration } => json!({
                "kind": "gate_succeeded",
                "duration_ms": u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            }),
        },
    }
}
